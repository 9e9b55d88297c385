//! Field validation shared by the write services.
//!
//! Every rule appends a message instead of returning early, so a single response can
//! list all rejected fields.

use url::Url;

use super::error::DomainError;

#[derive(Debug, Default)]
pub struct Violations {
    messages: Vec<String>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn check(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.push(message);
        }
    }

    /// Required text whose character count must fall in `min..=max`.
    pub fn length(&mut self, field: &str, value: Option<&str>, min: usize, max: usize) {
        match value.map(str::trim) {
            None => self.push(format!("{field} is required")),
            Some("") => self.push(format!("{field} must not be empty")),
            Some(text) => {
                let count = text.chars().count();
                self.check(
                    (min..=max).contains(&count),
                    format!("{field} must be between {min} and {max} characters"),
                );
            }
        }
    }

    /// Optional text; only checked when present.
    pub fn optional_length(&mut self, field: &str, value: Option<&str>, min: usize, max: usize) {
        if value.is_some() {
            self.length(field, value, min, max);
        }
    }

    pub fn positive(&mut self, field: &str, value: Option<i64>) {
        match value {
            None => self.push(format!("{field} is required")),
            Some(v) => self.check(v > 0, format!("{field} must be a positive integer")),
        }
    }

    pub fn non_negative(&mut self, field: &str, value: Option<i64>) {
        if let Some(v) = value {
            self.check(v >= 0, format!("{field} must not be negative"));
        }
    }

    pub fn url(&mut self, field: &str, value: Option<&str>) {
        if let Some(raw) = value.filter(|v| !v.trim().is_empty()) {
            let ok = Url::parse(raw.trim())
                .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
                .unwrap_or(false);
            self.check(ok, format!("{field} must be a valid URL"));
        }
    }

    pub fn email(&mut self, field: &str, value: Option<&str>) {
        match value.map(str::trim) {
            None | Some("") => self.push(format!("{field} is required")),
            Some(text) => self.check(is_email(text), format!("{field} is not a valid address")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_result(self) -> Result<(), DomainError> {
        if self.messages.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation {
                messages: self.messages,
            })
        }
    }
}

fn is_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !text.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(v: Violations) -> Vec<String> {
        match v.into_result() {
            Ok(()) => Vec::new(),
            Err(DomainError::Validation { messages }) => messages,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let mut v = Violations::new();
        v.length("title", Some("第一"), 2, 45);
        assert!(v.is_empty());

        v.length("title", Some("x"), 2, 45);
        assert_eq!(
            messages(v),
            vec!["title must be between 2 and 45 characters".to_string()]
        );
    }

    #[test]
    fn collects_every_failure() {
        let mut v = Violations::new();
        v.length("title", None, 2, 45);
        v.positive("rank", Some(0));
        v.url("video", Some("not a url"));
        assert_eq!(messages(v).len(), 3);
    }

    #[test]
    fn url_requires_http_scheme_and_host() {
        let mut v = Violations::new();
        v.url("video", Some("https://cdn.example.com/a.mp4"));
        v.url("video", None);
        v.url("video", Some(""));
        assert!(v.is_empty());

        v.url("video", Some("ftp://example.com/a.mp4"));
        assert!(!v.is_empty());
    }

    #[test]
    fn email_shape() {
        assert!(is_email("a@b.cn"));
        assert!(!is_email("a@b"));
        assert!(!is_email("@b.cn"));
        assert!(!is_email("a b@c.cn"));
        assert!(!is_email("a@@b.cn"));
    }
}
