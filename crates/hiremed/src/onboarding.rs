//! Onboarding: maps the web form into the bot's YAML configuration and
//! extracts profile fields from uploaded resumes.
//!
//! The form-to-config mapping is a static transform; section and field order
//! in the written YAML mirrors what the bot's settings loader expects.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Resume uploads larger than this are rejected.
pub const MAX_RESUME_BYTES: usize = 6 * 1024 * 1024;
/// Only the head of the resume is sent to the language model.
pub const RESUME_PROMPT_LIMIT: usize = 4000;

fn csv_list(value: Option<&str>, fallback: &[&str]) -> Vec<String> {
    let items: Vec<String> = value
        .unwrap_or_default()
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();

    if items.is_empty() {
        fallback.iter().map(|item| item.to_string()).collect()
    } else {
        items
    }
}

fn text(value: Option<String>, fallback: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => fallback.to_string(),
    }
}

/// Raw onboarding form payload. Every field is optional; defaults fill in
/// whatever the form left blank.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OnboardingForm {
    pub ollama_base_url: Option<String>,
    pub ollama_model: Option<String>,
    pub ollama_temperature: Option<f64>,

    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub user_phone: Option<String>,
    pub user_title: Option<String>,
    pub user_linkedin: Option<String>,
    pub user_portfolio: Option<String>,
    pub user_github: Option<String>,
    pub user_skills: Option<String>,
    pub user_experience: Option<String>,
    pub user_education: Option<String>,
    pub resume_path: Option<String>,

    pub linkedin_email: Option<String>,
    pub linkedin_password: Option<String>,
    pub linkedin_headless: Option<bool>,
    pub linkedin_target_roles: Option<String>,
    pub linkedin_target_industry: Option<String>,
    pub linkedin_job_titles: Option<String>,
    pub linkedin_daily_connections: Option<u32>,
    pub linkedin_daily_messages: Option<u32>,
    pub linkedin_daily_applications: Option<u32>,
    pub linkedin_max_connections: Option<u32>,
    pub linkedin_background: Option<String>,

    pub gmail_email: Option<String>,
    pub gmail_app_password: Option<String>,
    pub gmail_recipients_csv: Option<String>,
    pub gmail_daily_limit: Option<u32>,
    pub gmail_delay: Option<u32>,
    pub gmail_name: Option<String>,
    pub gmail_title: Option<String>,
    pub gmail_phone: Option<String>,
    pub gmail_linkedin: Option<String>,
    pub gmail_portfolio: Option<String>,
    pub gmail_skills: Option<String>,
    pub gmail_experience: Option<String>,

    pub x_api_key: Option<String>,
    pub x_api_secret: Option<String>,
    pub x_access_token: Option<String>,
    pub x_access_token_secret: Option<String>,
    pub x_bearer_token: Option<String>,
    pub x_daily_posts: Option<u32>,
    pub x_daily_engagements: Option<u32>,
    pub x_delay_between_posts: Option<u32>,
    pub x_auto_reply: Option<bool>,
    pub x_post_schedule: Option<String>,

    pub jobs_headless: Option<bool>,
    pub jobs_daily_limit: Option<u32>,
    pub unstop_email: Option<String>,
    pub unstop_password: Option<String>,
    pub naukri_email: Option<String>,
    pub naukri_password: Option<String>,
    pub internshala_email: Option<String>,
    pub internshala_password: Option<String>,
    pub jobs_keywords: Option<String>,
    pub jobs_location: Option<String>,
    pub jobs_category: Option<String>,
    pub jobs_name: Option<String>,
    pub jobs_email: Option<String>,
    pub jobs_phone: Option<String>,
    pub jobs_skills: Option<String>,
    pub jobs_experience: Option<String>,
    pub jobs_education: Option<String>,
    pub jobs_resume_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OllamaSection {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub title: String,
    pub linkedin: String,
    pub portfolio: String,
    pub github: String,
    pub skills: String,
    pub experience: String,
    pub education: String,
    pub resume_path: String,
}

#[derive(Debug, Serialize)]
pub struct LinkedinSection {
    pub email: String,
    pub password: String,
    pub headless: bool,
    pub target_roles: Vec<String>,
    pub target_industry: String,
    pub job_titles: Vec<String>,
    pub daily_connection_limit: u32,
    pub daily_message_limit: u32,
    pub daily_application_limit: u32,
    pub max_connections_per_search: u32,
    pub my_background: String,
}

#[derive(Debug, Serialize)]
pub struct GmailSection {
    pub email: String,
    pub app_password: String,
    pub recipients_csv: String,
    pub daily_email_limit: u32,
    pub delay_between_emails: u32,
    pub my_name: String,
    pub my_title: String,
    pub my_phone: String,
    pub my_linkedin: String,
    pub my_portfolio: String,
    pub my_skills: String,
    pub my_experience: String,
}

#[derive(Debug, Serialize)]
pub struct XSection {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
    pub bearer_token: String,
    pub daily_post_limit: u32,
    pub daily_engagement_limit: u32,
    pub delay_between_posts: u32,
    pub auto_reply: bool,
    pub post_schedule: Vec<String>,
    pub recruiters_to_follow: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct JobPlatformsSection {
    pub headless: bool,
    pub daily_application_limit: u32,
    pub unstop_email: String,
    pub unstop_password: String,
    pub naukri_email: String,
    pub naukri_password: String,
    pub internshala_email: String,
    pub internshala_password: String,
    pub job_keywords: Vec<String>,
    pub preferred_location: String,
    pub job_category: String,
    pub my_name: String,
    pub my_email: String,
    pub my_phone: String,
    pub my_skills: String,
    pub my_experience: String,
    pub my_education: String,
    pub resume_path: String,
}

/// The persisted bot configuration, section order matching the worker's
/// settings loader.
#[derive(Debug, Serialize)]
pub struct BotConfig {
    pub ollama: OllamaSection,
    pub user_profile: UserProfile,
    pub linkedin: LinkedinSection,
    pub gmail: GmailSection,
    pub x_twitter: XSection,
    pub job_platforms: JobPlatformsSection,
}

impl BotConfig {
    pub fn from_form(form: OnboardingForm) -> Self {
        Self {
            ollama: OllamaSection {
                base_url: text(form.ollama_base_url, "http://localhost:11434"),
                model: text(form.ollama_model, "llama2"),
                temperature: form.ollama_temperature.unwrap_or(0.7),
            },
            user_profile: UserProfile {
                name: text(form.user_name, "codernotme"),
                email: text(form.user_email, "your.email@gmail.com"),
                phone: text(form.user_phone, "+1234567890"),
                title: text(form.user_title, "Software Developer"),
                linkedin: text(form.user_linkedin, "https://linkedin.com/in/yourprofile"),
                portfolio: text(form.user_portfolio, "https://yourportfolio.com"),
                github: text(form.user_github, "https://github.com/codernotme"),
                skills: text(
                    form.user_skills,
                    "Python, JavaScript, React, Node.js, Docker",
                ),
                experience: text(form.user_experience, "3+ years in full-stack development"),
                education: text(form.user_education, "B.Tech in Computer Science"),
                resume_path: text(form.resume_path, "/path/to/your/resume.pdf"),
            },
            linkedin: LinkedinSection {
                email: text(form.linkedin_email, "your.linkedin.email@gmail.com"),
                password: text(form.linkedin_password, "your_linkedin_password"),
                headless: form.linkedin_headless.unwrap_or(false),
                target_roles: csv_list(
                    form.linkedin_target_roles.as_deref(),
                    &["HR Manager", "Technical Recruiter", "Talent Acquisition"],
                ),
                target_industry: text(form.linkedin_target_industry, "Technology"),
                job_titles: csv_list(
                    form.linkedin_job_titles.as_deref(),
                    &["Software Engineer", "Python Developer", "Full Stack Developer"],
                ),
                daily_connection_limit: form.linkedin_daily_connections.unwrap_or(20),
                daily_message_limit: form.linkedin_daily_messages.unwrap_or(10),
                daily_application_limit: form.linkedin_daily_applications.unwrap_or(15),
                max_connections_per_search: form.linkedin_max_connections.unwrap_or(10),
                my_background: text(
                    form.linkedin_background,
                    "Experienced software developer passionate about building scalable applications",
                ),
            },
            gmail: GmailSection {
                email: text(form.gmail_email, "your.gmail@gmail.com"),
                app_password: text(form.gmail_app_password, "your_gmail_app_password"),
                recipients_csv: text(form.gmail_recipients_csv, "config/recipients.csv"),
                daily_email_limit: form.gmail_daily_limit.unwrap_or(50),
                delay_between_emails: form.gmail_delay.unwrap_or(60),
                my_name: text(form.gmail_name, "codernotme"),
                my_title: text(form.gmail_title, "Software Developer"),
                my_phone: text(form.gmail_phone, "+1234567890"),
                my_linkedin: text(form.gmail_linkedin, "https://linkedin.com/in/yourprofile"),
                my_portfolio: text(form.gmail_portfolio, "https://yourportfolio.com"),
                my_skills: text(form.gmail_skills, "Python, React, Node.js, AWS"),
                my_experience: text(form.gmail_experience, "3+ years building web applications"),
            },
            x_twitter: XSection {
                api_key: text(form.x_api_key, "your_x_api_key"),
                api_secret: text(form.x_api_secret, "your_x_api_secret"),
                access_token: text(form.x_access_token, "your_x_access_token"),
                access_token_secret: text(
                    form.x_access_token_secret,
                    "your_x_access_token_secret",
                ),
                bearer_token: text(form.x_bearer_token, "your_x_bearer_token"),
                daily_post_limit: form.x_daily_posts.unwrap_or(3),
                daily_engagement_limit: form.x_daily_engagements.unwrap_or(20),
                delay_between_posts: form.x_delay_between_posts.unwrap_or(3600),
                auto_reply: form.x_auto_reply.unwrap_or(false),
                post_schedule: csv_list(
                    form.x_post_schedule.as_deref(),
                    &["09:00", "13:00", "18:00"],
                ),
                recruiters_to_follow: Vec::new(),
            },
            job_platforms: JobPlatformsSection {
                headless: form.jobs_headless.unwrap_or(false),
                daily_application_limit: form.jobs_daily_limit.unwrap_or(15),
                unstop_email: text(form.unstop_email, "your.unstop.email@gmail.com"),
                unstop_password: text(form.unstop_password, "your_unstop_password"),
                naukri_email: text(form.naukri_email, "your.naukri.email@gmail.com"),
                naukri_password: text(form.naukri_password, "your_naukri_password"),
                internshala_email: text(
                    form.internshala_email,
                    "your.internshala.email@gmail.com",
                ),
                internshala_password: text(
                    form.internshala_password,
                    "your_internshala_password",
                ),
                job_keywords: csv_list(
                    form.jobs_keywords.as_deref(),
                    &["Python Developer", "Software Engineer", "Full Stack Developer"],
                ),
                preferred_location: text(form.jobs_location, "Remote"),
                job_category: text(form.jobs_category, "Software Development"),
                my_name: text(form.jobs_name, "codernotme"),
                my_email: text(form.jobs_email, "your.email@gmail.com"),
                my_phone: text(form.jobs_phone, "+1234567890"),
                my_skills: text(form.jobs_skills, "Python, JavaScript, React"),
                my_experience: text(form.jobs_experience, "3 years"),
                my_education: text(form.jobs_education, "B.Tech Computer Science"),
                resume_path: text(form.jobs_resume_path, "/path/to/resume.pdf"),
            },
        }
    }
}

/// Serialize the config and write it to `<workdir>/config/config.yaml`.
pub async fn write_config(workdir: &Path, config: &BotConfig) -> io::Result<PathBuf> {
    let yaml = serde_yaml::to_string(config).map_err(io::Error::other)?;
    let path = workdir.join("config").join("config.yaml");
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, yaml).await?;
    Ok(path)
}

/// Collapse all runs of whitespace to single spaces.
pub fn sanitize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Contact fields recovered from the resume text by pattern matching; used
/// as a fallback when the language model is unavailable or incomplete.
#[derive(Debug, Default, Clone)]
pub struct ResumeBasics {
    pub email: String,
    pub phone: String,
    pub github: String,
    pub linkedin: String,
    pub portfolio: String,
}

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("resume pattern is valid"))
}

pub fn extract_basics(text: &str) -> ResumeBasics {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    static PHONE: OnceLock<Regex> = OnceLock::new();
    static GITHUB: OnceLock<Regex> = OnceLock::new();
    static LINKEDIN: OnceLock<Regex> = OnceLock::new();
    static URL: OnceLock<Regex> = OnceLock::new();

    let email = pattern(&EMAIL, r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}")
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let phone = pattern(&PHONE, r"\+?\d[\d\s().-]{8,}\d")
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let github = pattern(&GITHUB, r"(?i)https?://github\.com/[^\s)]+")
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let linkedin = pattern(&LINKEDIN, r"(?i)https?://(www\.)?linkedin\.com/[^\s)]+")
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    // Portfolio: the first URL that is not a www-prefixed host (and not one
    // of the profiles matched above).
    let portfolio = pattern(&URL, r"(?i)https?://[^\s)]+")
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|url| {
            let host = url
                .split("://")
                .nth(1)
                .unwrap_or_default()
                .to_ascii_lowercase();
            !host.starts_with("www.")
        })
        .map(|m| m.to_string())
        .unwrap_or_default();

    ResumeBasics {
        email,
        phone,
        github,
        linkedin,
        portfolio,
    }
}

pub fn resume_prompt(text: &str) -> String {
    format!(
        "Extract resume details as JSON with keys: name, email, phone, title, \
         linkedin, portfolio, github, skills, experience, education. Use empty \
         string when unknown. Resume text:\n\n{text}"
    )
}

/// Profile fields in the shape the onboarding form consumes.
#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResumeFields {
    pub user_name: String,
    pub user_email: String,
    pub user_phone: String,
    pub user_title: String,
    pub user_linkedin: String,
    pub user_portfolio: String,
    pub user_github: String,
    pub user_skills: String,
    pub user_experience: String,
    pub user_education: String,
}

/// Merge the language-model output over the pattern-matched basics; model
/// values win when present.
pub fn merge_resume_fields(ai: Option<serde_json::Value>, basics: &ResumeBasics) -> ResumeFields {
    let ai = ai.unwrap_or_else(|| serde_json::json!({}));
    let pick = |key: &str, fallback: &str| -> String {
        match ai.get(key).and_then(|v| v.as_str()) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => fallback.to_string(),
        }
    };

    ResumeFields {
        user_name: pick("name", ""),
        user_email: pick("email", &basics.email),
        user_phone: pick("phone", &basics.phone),
        user_title: pick("title", ""),
        user_linkedin: pick("linkedin", &basics.linkedin),
        user_portfolio: pick("portfolio", &basics.portfolio),
        user_github: pick("github", &basics.github),
        user_skills: pick("skills", ""),
        user_experience: pick("experience", ""),
        user_education: pick("education", ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_list_parses_and_trims() {
        assert_eq!(
            csv_list(Some("a, b , ,c"), &["x"]),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn csv_list_falls_back_when_empty() {
        assert_eq!(csv_list(None, &["x", "y"]), vec!["x", "y"]);
        assert_eq!(csv_list(Some("  ,  "), &["x"]), vec!["x"]);
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize_text("  a\n\tb   c  "), "a b c");
    }

    #[test]
    fn extract_basics_finds_contact_fields() {
        let text = "Jane Doe jane.doe@example.com +1 (555) 123-4567 \
                    https://github.com/janedoe https://www.linkedin.com/in/janedoe \
                    https://janedoe.dev";
        let basics = extract_basics(text);

        assert_eq!(basics.email, "jane.doe@example.com");
        assert!(basics.phone.starts_with("+1"));
        assert_eq!(basics.github, "https://github.com/janedoe");
        assert_eq!(basics.linkedin, "https://www.linkedin.com/in/janedoe");
        assert_eq!(basics.portfolio, "https://github.com/janedoe");
    }

    #[test]
    fn merge_prefers_model_output_over_basics() {
        let basics = ResumeBasics {
            email: "fallback@example.com".to_string(),
            ..Default::default()
        };
        let ai = serde_json::json!({"name": "Jane", "email": "jane@example.com"});

        let fields = merge_resume_fields(Some(ai), &basics);
        assert_eq!(fields.user_name, "Jane");
        assert_eq!(fields.user_email, "jane@example.com");
    }

    #[test]
    fn merge_falls_back_to_basics_without_model_output() {
        let basics = ResumeBasics {
            email: "fallback@example.com".to_string(),
            github: "https://github.com/jane".to_string(),
            ..Default::default()
        };

        let fields = merge_resume_fields(None, &basics);
        assert_eq!(fields.user_email, "fallback@example.com");
        assert_eq!(fields.user_github, "https://github.com/jane");
        assert_eq!(fields.user_name, "");
    }

    #[test]
    fn empty_form_uses_documented_defaults() {
        let config = BotConfig::from_form(OnboardingForm::default());

        assert_eq!(config.ollama.base_url, "http://localhost:11434");
        assert_eq!(config.ollama.model, "llama2");
        assert_eq!(config.linkedin.daily_connection_limit, 20);
        assert_eq!(
            config.linkedin.target_roles,
            vec!["HR Manager", "Technical Recruiter", "Talent Acquisition"]
        );
        assert_eq!(config.x_twitter.post_schedule, vec!["09:00", "13:00", "18:00"]);
        assert!(config.x_twitter.recruiters_to_follow.is_empty());
    }

    #[test]
    fn form_values_override_defaults() {
        let form = OnboardingForm {
            user_name: Some("Jane".to_string()),
            linkedin_target_roles: Some("Founder, CTO".to_string()),
            gmail_daily_limit: Some(5),
            ..Default::default()
        };
        let config = BotConfig::from_form(form);

        assert_eq!(config.user_profile.name, "Jane");
        assert_eq!(config.linkedin.target_roles, vec!["Founder", "CTO"]);
        assert_eq!(config.gmail.daily_email_limit, 5);
    }

    #[tokio::test]
    async fn config_round_trips_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = BotConfig::from_form(OnboardingForm::default());

        let path = write_config(dir.path(), &config).await.unwrap();
        assert_eq!(path, dir.path().join("config/config.yaml"));

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&written).unwrap();
        assert_eq!(
            value["ollama"]["base_url"].as_str(),
            Some("http://localhost:11434")
        );
        assert!(value["job_platforms"]["job_keywords"].is_sequence());
    }
}
