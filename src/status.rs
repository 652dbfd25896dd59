//! Status marker extraction from assistant replies.
//!
//! The assistant embeds a single `STATUS: <TOKEN>` line in its reply to
//! signal lead disposition. The marker is stripped from the user-visible
//! text and the token mapped to the CRM status vocabulary.

/// Line prefix the assistant uses to embed a status token.
pub const STATUS_PREFIX: &str = "STATUS:";

/// Lead disposition as recognized by the CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadStatus {
    /// Default when the reply carries no marker or an unrecognized token.
    Received,
    FollowUp,
    Interested,
    NotInterested,
}

impl LeadStatus {
    /// Map a raw token (case-insensitive) to a status.
    ///
    /// The mapping is total: unrecognized tokens fall back to `Received`
    /// rather than failing.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_uppercase().as_str() {
            "FOLLOWUP" => Self::FollowUp,
            "INTERESSIERT" => Self::Interested,
            "UNINTERESSIERT" => Self::NotInterested,
            _ => Self::Received,
        }
    }

    /// The value written to the CRM status field.
    pub fn crm_value(self) -> &'static str {
        match self {
            Self::Received => "Erhalten",
            Self::FollowUp => "Follow Up",
            Self::Interested => "Interessiert",
            Self::NotInterested => "Uninteressiert",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.crm_value())
    }
}

/// Split an assistant reply into the user-visible text and the lead status.
///
/// Every line whose trimmed form starts with `STATUS:` is removed from the
/// output; the first such line supplies the token. Replies without a marker
/// pass through unchanged and resolve to [`LeadStatus::Received`].
pub fn extract_status(raw: &str) -> (String, LeadStatus) {
    let mut token: Option<String> = None;
    let mut kept: Vec<&str> = Vec::new();
    let mut stripped_any = false;

    for line in raw.lines() {
        if let Some(rest) = line.trim().strip_prefix(STATUS_PREFIX) {
            stripped_any = true;
            // First-seen marker wins; later ones are dropped silently.
            if token.is_none() {
                token = Some(rest.trim().to_string());
            }
            continue;
        }
        kept.push(line);
    }

    if !stripped_any {
        return (raw.to_string(), LeadStatus::Received);
    }

    let status = token
        .as_deref()
        .map(LeadStatus::from_token)
        .unwrap_or(LeadStatus::Received);

    (kept.join("\n"), status)
}
