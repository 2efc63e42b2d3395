//! Outreach-tag wizard: persona packs, model prompts, and response shaping
//! for the tag-wizard route.
//!
//! The model is asked for JSON-only completions; anything that fails to
//! parse counts as absent output and the static packs fill the gaps.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wizard request payload; `action` selects the operation, everything else
/// is optional context.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagWizardRequest {
    pub action: String,
    pub ollama_base_url: Option<String>,
    pub ollama_model: Option<String>,
    pub mcq_count: Option<u32>,
    pub profile: Option<Value>,
    pub questions: Option<Value>,
    pub answers: Option<Value>,
    pub persona: Option<String>,
}

/// Static fallback tag packs, keyed by audience persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    Cto,
    Hr,
    Founder,
}

pub struct PersonaPack {
    pub linkedin_target_tags: &'static [&'static str],
    pub gmail_target_tags: &'static [&'static str],
    pub linkedin_message_tags: &'static [&'static str],
}

impl Persona {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "cto" => Some(Self::Cto),
            "hr" => Some(Self::Hr),
            "founder" => Some(Self::Founder),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cto => "cto",
            Self::Hr => "hr",
            Self::Founder => "founder",
        }
    }

    pub fn pack(&self) -> PersonaPack {
        match self {
            Self::Cto => PersonaPack {
                linkedin_target_tags: &[
                    "CTO",
                    "VP Engineering",
                    "Engineering Leader",
                    "Tech Strategy",
                    "Platform",
                    "Scale",
                ],
                gmail_target_tags: &["cto", "engineering", "platform", "leadership"],
                linkedin_message_tags: &["architecture", "scalability", "delivery"],
            },
            Self::Hr => PersonaPack {
                linkedin_target_tags: &[
                    "HR Manager",
                    "Talent Acquisition",
                    "Recruiter",
                    "People Ops",
                    "Hiring",
                ],
                gmail_target_tags: &["hr", "recruiter", "peopleops", "hiring"],
                linkedin_message_tags: &["availability", "role-fit", "pipeline"],
            },
            Self::Founder => PersonaPack {
                linkedin_target_tags: &["Founder", "Co-founder", "CEO", "Startup", "Product"],
                gmail_target_tags: &["founder", "startup", "early-stage", "product"],
                linkedin_message_tags: &["ownership", "speed", "product-build"],
            },
        }
    }
}

/// Trimmed, non-blank strings from a JSON array; anything else is empty.
pub fn normalize_tags(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
        .filter(|item| !item.is_empty())
        .collect()
}

/// Tag lists in the shape the wizard UI consumes.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TagSet {
    pub linkedin_target_tags: Vec<String>,
    pub gmail_target_tags: Vec<String>,
    pub linkedin_message_tags: Vec<String>,
    pub explanations: Vec<String>,
}

impl TagSet {
    /// Lift the tag lists out of a model completion; `None` behaves as an
    /// empty object.
    pub fn from_model(result: Option<&Value>) -> Self {
        let get = |key: &str| normalize_tags(result.and_then(|v| v.get(key)));
        Self {
            linkedin_target_tags: get("linkedin_target_tags"),
            gmail_target_tags: get("gmail_target_tags"),
            linkedin_message_tags: get("linkedin_message_tags"),
            explanations: get("explanations"),
        }
    }

    /// Replace each empty list with the persona's static pack; an empty
    /// explanation list gets the default-pack notice.
    pub fn or_persona_defaults(mut self, persona: Persona) -> Self {
        let pack = persona.pack();
        let fill = |own: &mut Vec<String>, fallback: &[&str]| {
            if own.is_empty() {
                *own = fallback.iter().map(|tag| tag.to_string()).collect();
            }
        };
        fill(&mut self.linkedin_target_tags, pack.linkedin_target_tags);
        fill(&mut self.gmail_target_tags, pack.gmail_target_tags);
        fill(&mut self.linkedin_message_tags, pack.linkedin_message_tags);
        if self.explanations.is_empty() {
            self.explanations = vec![format!(
                "Applied default {} persona pack.",
                persona.as_str().to_uppercase()
            )];
        }
        self
    }
}

pub fn questions_prompt(mcq_count: u32, profile: &Value) -> String {
    format!(
        "Create {mcq_count} multiple-choice questions to determine smart \
         outreach tags for LinkedIn and Gmail.\n\nUser profile (JSON):\n{profile}\n\n\
         Return JSON only with this shape:\n{{\n  \"questions\": [\n    {{\n      \
         \"id\": \"q1\",\n      \"question\": \"...\",\n      \"options\": [\n        \
         {{\"id\": \"a\", \"text\": \"...\"}},\n        {{\"id\": \"b\", \"text\": \"...\"}},\n        \
         {{\"id\": \"c\", \"text\": \"...\"}},\n        {{\"id\": \"d\", \"text\": \"...\"}}\n      ]\n    }}\n  ]\n}}"
    )
}

const TAG_SHAPE: &str = "Return JSON only with this shape:\n{\n  \
    \"linkedin_target_tags\": [\"...\"],\n  \"gmail_target_tags\": [\"...\"],\n  \
    \"linkedin_message_tags\": [\"...\"],\n  \"explanations\": [\"...\"]\n}";

pub fn score_prompt(profile: &Value, questions: &Value, answers: &Value) -> String {
    format!(
        "You are assigning smart outreach tags based on a user's answers.\n\n\
         User profile (JSON):\n{profile}\n\nQuestions (JSON):\n{questions}\n\n\
         Answers (JSON, key=question id, value=option id):\n{answers}\n\n{TAG_SHAPE}"
    )
}

pub fn persona_prompt(persona: Persona, profile: &Value) -> String {
    format!(
        "Select outreach tags for persona pack: {}.\n\nUser profile (JSON):\n{profile}\n\n{TAG_SHAPE}",
        persona.as_str()
    )
}

pub fn variants_prompt(profile: &Value) -> String {
    format!(
        "Generate three LinkedIn message variants (short, medium, long).\n\n\
         User profile (JSON):\n{profile}\n\nReturn JSON only with this shape:\n\
         {{\n  \"short\": \"...\",\n  \"medium\": \"...\",\n  \"long\": \"...\"\n}}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn persona_parse_is_case_insensitive() {
        assert_eq!(Persona::parse("CTO"), Some(Persona::Cto));
        assert_eq!(Persona::parse("founder"), Some(Persona::Founder));
        assert_eq!(Persona::parse("intern"), None);
        assert_eq!(Persona::parse(""), None);
    }

    #[test]
    fn normalize_tags_trims_and_drops_blanks() {
        let value = json!(["  CTO ", "", "Platform", 7]);
        assert_eq!(
            normalize_tags(Some(&value)),
            vec!["CTO".to_string(), "Platform".to_string(), "7".to_string()]
        );
        assert!(normalize_tags(Some(&json!("not an array"))).is_empty());
        assert!(normalize_tags(None).is_empty());
    }

    #[test]
    fn empty_model_lists_fall_back_to_the_pack() {
        let tags = TagSet::from_model(None).or_persona_defaults(Persona::Hr);
        assert_eq!(tags.linkedin_target_tags[0], "HR Manager");
        assert_eq!(tags.gmail_target_tags[0], "hr");
        assert_eq!(
            tags.explanations,
            vec!["Applied default HR persona pack.".to_string()]
        );
    }

    #[test]
    fn model_lists_take_precedence_over_the_pack() {
        let result = json!({
            "linkedin_target_tags": ["Staff Engineer"],
            "explanations": ["matched profile"]
        });
        let tags = TagSet::from_model(Some(&result)).or_persona_defaults(Persona::Cto);
        assert_eq!(tags.linkedin_target_tags, vec!["Staff Engineer".to_string()]);
        assert_eq!(tags.explanations, vec!["matched profile".to_string()]);
        // Lists the model left empty still come from the pack.
        assert_eq!(tags.gmail_target_tags[0], "cto");
    }

    #[test]
    fn prompts_embed_the_profile_json() {
        let profile = json!({ "name": "Jane" });
        assert!(questions_prompt(5, &profile).contains("\"name\":\"Jane\""));
        assert!(persona_prompt(Persona::Cto, &profile).contains("persona pack: cto"));
        assert!(
            score_prompt(&profile, &json!([]), &json!({}))
                .contains("key=question id, value=option id")
        );
    }
}
