//! Placeholder substitution for subjects and bodies

use outreach_storage::models::Client;
use regex::{Captures, Regex};

/// Fallback for `{{company_name}}` when the client has none
pub const COMPANY_NAME_FALLBACK: &str = "there";

const PLACEHOLDER_PATTERN: &str = r"\{\{([a-z_]+)\}\}";

/// Replaces `{{token}}` placeholders with client attributes.
///
/// Supported tokens are `company_name`, `email`, `city`, `category`, `website`
/// and `phone`. Missing attributes become an empty string, except
/// `company_name` which falls back to "there". Unknown tokens are left as they
/// are. Substitution is a single pass, so attribute values that themselves look
/// like placeholders are never expanded.
pub struct Personalizer {
    placeholder: Regex,
}

impl Personalizer {
    pub fn new() -> Self {
        Self {
            placeholder: Regex::new(PLACEHOLDER_PATTERN).expect("placeholder pattern is valid"),
        }
    }

    pub fn personalize(&self, text: &str, client: &Client) -> String {
        self.placeholder
            .replace_all(text, |caps: &Captures| match value_for(&caps[1], client) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

impl Default for Personalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn value_for<'a>(token: &str, client: &'a Client) -> Option<&'a str> {
    let value = match token {
        "company_name" => {
            return Some(
                client
                    .company_name
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .unwrap_or(COMPANY_NAME_FALLBACK),
            )
        }
        "email" => &client.email,
        "city" => &client.city,
        "category" => &client.category,
        "website" => &client.website,
        "phone" => &client.phone_primary,
        _ => return None,
    };
    Some(value.as_deref().unwrap_or(""))
}
