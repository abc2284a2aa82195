//! Prompt assembler — renders the per-turn instruction.
//!
//! The instruction is a list of `# heading` + body blocks, in the order the
//! mode declares. Matched services are reproduced verbatim: names,
//! descriptions, and URLs are copied from the catalog record and never
//! rewritten. A record without a URL is presented as having an unknown URL.
//!
//! # Determinism
//!
//! Assembly is a pure function of its inputs. No time-dependent or random
//! content is rendered.

use madoguchi_config::PromptMode;
use madoguchi_core::service::RankedMatch;

/// Written in place of a missing URL.
pub const UNKNOWN_URL: &str = "不明（公式URLは提供されていません）";

// ── Sections ──────────────────────────────────────────────────────────────

/// A named block of the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Consultation,
    Categories,
    Tasks,
    Services,
    Style,
    Grounding,
}

impl Section {
    fn heading(self) -> &'static str {
        match self {
            Self::Consultation => "ユーザーからの相談",
            Self::Categories => "相談の分類",
            Self::Tasks => "あなたのタスク",
            Self::Services => "参考になる行政サービス",
            Self::Style => "回答のルール",
            Self::Grounding => "情報の正確さについて",
        }
    }
}

const GENERAL_FIRST: &[Section] = &[
    Section::Consultation,
    Section::Tasks,
    Section::Services,
    Section::Style,
    Section::Grounding,
];

const CLASSIFY_INTENT: &[Section] = &[
    Section::Consultation,
    Section::Categories,
    Section::Tasks,
    Section::Services,
    Section::Style,
    Section::Grounding,
];

const SERVICE_FOCUSED: &[Section] = &[
    Section::Consultation,
    Section::Services,
    Section::Tasks,
    Section::Style,
    Section::Grounding,
];

/// The ordered sections a mode renders.
pub fn sections_for(mode: PromptMode) -> &'static [Section] {
    match mode {
        PromptMode::GeneralFirst => GENERAL_FIRST,
        PromptMode::ClassifyIntent => CLASSIFY_INTENT,
        PromptMode::ServiceFocused => SERVICE_FOCUSED,
    }
}

// ── Builder ───────────────────────────────────────────────────────────────

/// Collects rendered sections and serializes them once at the end.
#[derive(Default)]
struct SectionBuilder {
    blocks: Vec<(&'static str, String)>,
}

impl SectionBuilder {
    fn push(&mut self, heading: &'static str, body: String) {
        self.blocks.push((heading, body));
    }

    fn finish(self) -> String {
        self.blocks
            .into_iter()
            .map(|(heading, body)| format!("# {heading}\n{}", body.trim_end()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {item}\n", i + 1))
        .collect()
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Renders the instruction for one turn.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    max_reply_chars: usize,
    help_line: String,
}

impl PromptAssembler {
    pub fn new(max_reply_chars: usize, help_line: impl Into<String>) -> Self {
        Self {
            max_reply_chars,
            help_line: help_line.into(),
        }
    }

    /// Build the instruction text for `user_message` with the given matches.
    pub fn assemble(&self, user_message: &str, matches: &[RankedMatch], mode: PromptMode) -> String {
        let mut builder = SectionBuilder::default();
        for &section in sections_for(mode) {
            let body = match section {
                Section::Consultation => format!("「{}」\n", user_message.trim()),
                Section::Categories => self.categories(),
                Section::Tasks => self.tasks(mode, !matches.is_empty()),
                Section::Services => self.services(mode, matches),
                Section::Style => self.style(),
                Section::Grounding => self.grounding(),
            };
            builder.push(section.heading(), body);
        }
        builder.finish()
    }

    fn categories(&self) -> String {
        numbered(&[
            "一般的な子育て相談（生活習慣、遊び、しつけ、気持ちの悩みなど）".into(),
            "行政サービス・手続きに関する問い合わせ（手当、保育園、健診など）".into(),
            "医療的な判断が必要な相談（発熱、けが、発達の心配など）".into(),
        ])
    }

    fn tasks(&self, mode: PromptMode, has_matches: bool) -> String {
        let tasks: Vec<String> = match (mode, has_matches) {
            (PromptMode::GeneralFirst, true) => vec![
                "まず、相談内容に対して一般的なアドバイスを分かりやすく答えてください。".into(),
                "次に、下の「参考になる行政サービス」の中から相談に役立つものがあれば、1つか2つ選んで紹介してください。".into(),
                "サービスを紹介するときは、名前とURLを書かれているとおりに伝えてください。".into(),
            ],
            (PromptMode::GeneralFirst, false) => vec![
                "相談内容に対して一般的なアドバイスを分かりやすく答えてください。".into(),
                "関連する行政サービスは見つかっていないため、具体的なサービス名やURLは紹介しないでください。".into(),
                "必要に応じて、お住まいの市区町村の窓口で確認できることを伝えてください。".into(),
            ],
            (PromptMode::ClassifyIntent, true) => vec![
                "相談が「相談の分類」のどれに当たるかを判断してください（分類名は回答に書かなくてかまいません）。".into(),
                "1の場合は一般的なアドバイスを中心に答え、役立つサービスがあれば添えてください。".into(),
                "2の場合は「参考になる行政サービス」から当てはまるものを中心に紹介してください。".into(),
                format!("3の場合は判断をせず、{}への相談をすすめてください。", self.help_line),
            ],
            (PromptMode::ClassifyIntent, false) => vec![
                "相談が「相談の分類」のどれに当たるかを判断してください（分類名は回答に書かなくてかまいません）。".into(),
                "1の場合は一般的なアドバイスを答えてください。".into(),
                "2の場合は、該当するサービスが見つからなかったことを伝え、お住まいの市区町村の窓口で確認するよう案内してください。".into(),
                format!("3の場合は判断をせず、{}への相談をすすめてください。", self.help_line),
            ],
            (PromptMode::ServiceFocused, true) => vec![
                "上の「参考になる行政サービス」から相談に合うものを選び、最初に紹介してください。".into(),
                "サービスの名前とURLは書かれているとおりに伝えてください。".into(),
                "そのあとに、一般的なアドバイスを短く添えてください。".into(),
            ],
            (PromptMode::ServiceFocused, false) => vec![
                "該当する行政サービスは見つからなかったことを、やさしく伝えてください。".into(),
                "お住まいの市区町村の子育て窓口で確認できることを案内してください。".into(),
                "そのうえで、一般的なアドバイスを短く添えてください。".into(),
            ],
        };
        numbered(&tasks)
    }

    fn services(&self, mode: PromptMode, matches: &[RankedMatch]) -> String {
        if matches.is_empty() {
            return match mode {
                PromptMode::ServiceFocused => {
                    "該当するサービスはありません。サービス名やURLを推測して書かないでください。\n".into()
                }
                _ => "該当するサービスはありません。\n".into(),
            };
        }

        let mut out = String::new();
        for (i, m) in matches.iter().enumerate() {
            let record = &m.record;
            out.push_str(&format!("{}. {}\n", i + 1, record.name));
            if !record.description.is_empty() {
                out.push_str(&format!("   説明: {}\n", record.description));
            }
            let url = record.url.as_deref().unwrap_or(UNKNOWN_URL);
            out.push_str(&format!("   URL: {url}\n"));
        }
        out
    }

    fn style(&self) -> String {
        [
            "親しみやすく、やさしい言葉づかいで答えてください。".to_string(),
            format!("回答は{}文字以内にまとめてください。", self.max_reply_chars),
            format!(
                "病気やけが、発達など医療的な判断が必要な内容には答えを断定せず、{}に相談するよう伝えてください。",
                self.help_line
            ),
        ]
        .iter()
        .map(|line| format!("- {line}\n"))
        .collect()
    }

    fn grounding(&self) -> String {
        [
            "URLは「参考になる行政サービス」に書かれたものだけを使い、それ以外のURLを作ったり推測したりしないでください。",
            "URLが「不明」となっているサービスは、URLが分からないことをそのまま伝えてください。",
            "確かでない制度の金額や条件は断定しないでください。",
        ]
        .iter()
        .map(|line| format!("- {line}\n"))
        .collect()
    }
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(400, "かかりつけの小児科医")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use madoguchi_core::service::ServiceRecord;

    fn matched(name: &str, url: Option<&str>) -> RankedMatch {
        RankedMatch {
            record: ServiceRecord {
                name: name.into(),
                description: format!("{name}についての案内です。"),
                url: url.map(String::from),
                keywords: vec![],
            },
            score: 3,
        }
    }

    const ALL_MODES: [PromptMode; 3] = [
        PromptMode::GeneralFirst,
        PromptMode::ClassifyIntent,
        PromptMode::ServiceFocused,
    ];

    #[test]
    fn contains_every_literal_url() {
        let matches = vec![
            matched("児童手当", Some("https://www.city.example.jp/kosodate/teate?id=1&x=2")),
            matched("一時保育", Some("https://example.jp/ichiji")),
        ];
        for mode in ALL_MODES {
            let text = PromptAssembler::default().assemble("質問", &matches, mode);
            assert!(text.contains("https://www.city.example.jp/kosodate/teate?id=1&x=2"));
            assert!(text.contains("https://example.jp/ichiji"));
            assert!(text.contains("児童手当についての案内です。"));
        }
    }

    #[test]
    fn missing_url_stated_as_unknown() {
        let text = PromptAssembler::default().assemble(
            "質問",
            &[matched("乳幼児健診", None)],
            PromptMode::GeneralFirst,
        );
        assert!(text.contains(&format!("URL: {UNKNOWN_URL}")));
    }

    #[test]
    fn no_matches_still_valid_instruction() {
        for mode in ALL_MODES {
            let text = PromptAssembler::default().assemble("今日は雨ですね", &[], mode);
            assert!(!text.is_empty());
            assert!(text.contains("「今日は雨ですね」"));
            assert!(text.contains("該当するサービスはありません"));
            assert!(!text.contains("URL: "));
        }
    }

    #[test]
    fn fallback_wording_depends_on_mode() {
        let a = PromptAssembler::default();
        let general = a.assemble("q", &[], PromptMode::GeneralFirst);
        let focused = a.assemble("q", &[], PromptMode::ServiceFocused);
        assert_ne!(general, focused);
        assert!(focused.contains("サービス名やURLを推測して書かないでください"));
    }

    #[test]
    fn sections_follow_mode_order() {
        let matches = [matched("児童手当", Some("https://example.jp"))];
        let a = PromptAssembler::default();

        let general = a.assemble("q", &matches, PromptMode::GeneralFirst);
        assert!(general.find("# あなたのタスク").unwrap() < general.find("# 参考になる行政サービス").unwrap());
        assert!(!general.contains("# 相談の分類"));

        let focused = a.assemble("q", &matches, PromptMode::ServiceFocused);
        assert!(focused.find("# 参考になる行政サービス").unwrap() < focused.find("# あなたのタスク").unwrap());

        let classify = a.assemble("q", &matches, PromptMode::ClassifyIntent);
        assert!(classify.contains("# 相談の分類"));
        assert!(classify.contains("医療的な判断が必要な相談"));
    }

    #[test]
    fn every_mode_has_closing_and_grounding() {
        let a = PromptAssembler::new(250, "小児救急電話相談（#8000）");
        for mode in ALL_MODES {
            let text = a.assemble("q", &[], mode);
            assert!(text.starts_with("# ユーザーからの相談"));
            assert!(text.contains("250文字以内"));
            assert!(text.contains("小児救急電話相談（#8000）"));
            assert!(text.contains("それ以外のURLを作ったり推測したりしないでください"));
            assert_eq!(sections_for(mode).last(), Some(&Section::Grounding));
        }
    }

    #[test]
    fn deterministic() {
        let matches = [matched("児童手当", Some("https://example.jp"))];
        let a = PromptAssembler::default();
        assert_eq!(
            a.assemble("q", &matches, PromptMode::ClassifyIntent),
            a.assemble("q", &matches, PromptMode::ClassifyIntent)
        );
    }
}
