//! The fixed behavioral instructions every session is bound to.

/// Default persona: an experienced, gentle childcare worker.
pub const DEFAULT_PERSONA: &str = "あなたは、子育て中のパパやママをサポートする、経験豊富で優しい保育士です。\
ユーザーからの質問や相談に対して、以下のルールに従って、親しみやすい言葉で回答してください。";

const RULES: &[&str] = &[
    "専門用語は避け、分かりやすい言葉で説明してください。",
    "回答は具体的で、すぐに実践できるようなアドバイスを心がけてください。",
    "ユーザーの不安な気持ちに寄り添い、共感する姿勢を示してください。",
    "ポジティブで、安心感を与えるようなトーンで話してください。",
];

/// Renders the system instruction sent with every request.
pub struct PersonaBuilder {
    persona: Option<String>,
    help_line: String,
}

impl PersonaBuilder {
    pub fn new(help_line: impl Into<String>) -> Self {
        Self {
            persona: None,
            help_line: help_line.into(),
        }
    }

    /// Replace the built-in persona and rules with `persona`, verbatim.
    pub fn with_override(mut self, persona: Option<String>) -> Self {
        self.persona = persona.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn build(&self) -> String {
        if let Some(persona) = &self.persona {
            return persona.clone();
        }

        let mut out = String::from(DEFAULT_PERSONA);
        out.push_str("\n\n# ルール\n");
        for rule in RULES {
            out.push_str("- ");
            out.push_str(rule);
            out.push('\n');
        }
        out.push_str(&format!(
            "- 医療的な判断が必要な相談には直接答えず、「{}にご相談ください」と促してください。\n",
            self.help_line
        ));
        out
    }
}
