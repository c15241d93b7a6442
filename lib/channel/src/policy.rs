//! Telegram channel policy model, validation, and wire adapters.
//!
//! The backend has shipped two layouts for the same policy: a flat object
//! and a nested `{credential, rateLimit, security}` one. [`from_wire`]
//! accepts both and produces the canonical struct; [`to_wire`] always
//! emits the nested layout.

use serde_json::{json, Map, Value};

use crate::error::ChannelError;

/// Delivery rate bounds, messages per minute.
pub const RATE_LIMIT_MIN: u32 = 1;
pub const RATE_LIMIT_MAX: u32 = 600;
pub const DEFAULT_RATE_LIMIT: u32 = 60;

/// Default operator locale for channel-facing copy.
pub const DEFAULT_LOCALE: &str = "zh-CN";

/// Maximum length of a test message, in characters.
pub const TEST_MESSAGE_MAX_CHARS: usize = 256;

/// Canonical Telegram channel policy for one workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPolicy {
    /// Bot API token, `digits:secret` format.
    pub bot_token: String,
    /// Webhook endpoint; must be https unless polling.
    pub webhook_url: String,
    /// Long polling instead of webhook delivery.
    pub use_polling: bool,
    /// Outbound messages per minute, 1..=600.
    pub rate_limit_per_min: u32,
    /// Wait for pipeline completion before acknowledging updates.
    pub wait_for_result: bool,
    /// Operator locale for channel-facing copy.
    pub locale: String,
    /// Webhook secret token presented by Telegram on each update.
    pub secret_token: String,
    /// Monotonic counter bumped on every secret rotation.
    pub secret_version: u32,
    /// PEM certificate for self-signed webhook endpoints.
    pub certificate: Option<String>,
    /// Reply sent when an update reaches a missing workflow.
    pub workflow_missing_message: String,
    /// Reply sent when the pipeline misses its deadline.
    pub timeout_message: String,
    /// Chat ids allowed to reach the workflow; empty admits all.
    pub allowed_chat_ids: Vec<String>,
    /// Set by the backend on save, never sent.
    pub updated_at: Option<String>,
    pub updated_by: Option<String>,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            webhook_url: String::new(),
            use_polling: false,
            rate_limit_per_min: DEFAULT_RATE_LIMIT,
            wait_for_result: true,
            locale: DEFAULT_LOCALE.to_string(),
            secret_token: String::new(),
            secret_version: 0,
            certificate: None,
            workflow_missing_message: String::new(),
            timeout_message: String::new(),
            allowed_chat_ids: Vec::new(),
            updated_at: None,
            updated_by: None,
        }
    }
}

/// Masks a bot token for display: first six and last four characters kept.
///
/// Tokens of ten characters or fewer mask entirely.
#[must_use]
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 10 {
        return "****".to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

/// Checks the Telegram token shape: five or more digits, a colon, then
/// exactly 35 characters of `[A-Za-z0-9_-]`.
#[must_use]
pub fn token_format_ok(token: &str) -> bool {
    let Some((id, secret)) = token.split_once(':') else {
        return false;
    };
    id.len() >= 5
        && id.chars().all(|c| c.is_ascii_digit())
        && secret.len() == 35
        && secret
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Validates a policy before it is sent, returning the first failing field.
///
/// The token check only applies when a fresh token was entered; a stored
/// policy round-trips with the token masked.
pub fn validate(policy: &ChannelPolicy, check_token: bool) -> Result<(), ChannelError> {
    if check_token && !token_format_ok(&policy.bot_token) {
        return Err(ChannelError::Validation {
            field: "botToken",
            message: "bot token must look like 123456:ABC... (35-character secret)".to_string(),
        });
    }
    if !policy.use_polling && !policy.webhook_url.starts_with("https://") {
        return Err(ChannelError::Validation {
            field: "webhookUrl",
            message: "webhook URL must use https".to_string(),
        });
    }
    if !(RATE_LIMIT_MIN..=RATE_LIMIT_MAX).contains(&policy.rate_limit_per_min) {
        return Err(ChannelError::Validation {
            field: "rateLimitPerMin",
            message: format!("rate limit must be between {RATE_LIMIT_MIN} and {RATE_LIMIT_MAX}"),
        });
    }
    if policy.workflow_missing_message.chars().count() > TEST_MESSAGE_MAX_CHARS {
        return Err(ChannelError::Validation {
            field: "workflowMissingMessage",
            message: format!("reply message cannot exceed {TEST_MESSAGE_MAX_CHARS} characters"),
        });
    }
    if policy.timeout_message.chars().count() > TEST_MESSAGE_MAX_CHARS {
        return Err(ChannelError::Validation {
            field: "timeoutMessage",
            message: format!("reply message cannot exceed {TEST_MESSAGE_MAX_CHARS} characters"),
        });
    }
    Ok(())
}

/// Validates a test message body.
pub fn validate_test_message(message: &str) -> Result<(), ChannelError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(ChannelError::Validation {
            field: "message",
            message: "test message cannot be empty".to_string(),
        });
    }
    if trimmed.chars().count() > TEST_MESSAGE_MAX_CHARS {
        return Err(ChannelError::Validation {
            field: "message",
            message: format!("test message cannot exceed {TEST_MESSAGE_MAX_CHARS} characters"),
        });
    }
    Ok(())
}

fn str_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn nested<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    map.get(key).and_then(Value::as_object)
}

/// Builds the canonical policy from either wire layout.
///
/// Missing fields fall back to defaults; unknown fields are ignored.
#[must_use]
pub fn from_wire(body: &Value) -> ChannelPolicy {
    let mut policy = ChannelPolicy::default();
    let Some(map) = body.as_object() else {
        return policy;
    };

    let credential = nested(map, "credential");
    let rate_limit = nested(map, "rateLimit");
    let security = nested(map, "security");

    if let Some(token) = credential
        .and_then(|c| str_field(c, "botToken"))
        .or_else(|| str_field(map, "botToken"))
    {
        policy.bot_token = token;
    }
    if let Some(secret) = credential
        .and_then(|c| str_field(c, "secretToken"))
        .or_else(|| str_field(map, "secretToken"))
    {
        policy.secret_token = secret;
    }
    if let Some(url) = str_field(map, "webhookUrl") {
        policy.webhook_url = url;
    }
    if let Some(polling) = map.get("usePolling").and_then(Value::as_bool) {
        policy.use_polling = polling;
    }
    if let Some(locale) = str_field(map, "locale") {
        policy.locale = locale;
    }
    if let Some(per_min) = rate_limit
        .and_then(|r| r.get("perMinute"))
        .or_else(|| map.get("rateLimitPerMin"))
        .and_then(Value::as_u64)
    {
        policy.rate_limit_per_min = per_min.min(u64::from(u32::MAX)) as u32;
    }
    if let Some(wait) = rate_limit
        .and_then(|r| r.get("waitForResult"))
        .or_else(|| map.get("waitForResult"))
        .and_then(Value::as_bool)
    {
        policy.wait_for_result = wait;
    }
    if let Some(version) = security
        .and_then(|s| s.get("secretVersion"))
        .or_else(|| map.get("secretVersion"))
        .and_then(Value::as_u64)
    {
        policy.secret_version = version.min(u64::from(u32::MAX)) as u32;
    }
    policy.certificate = security
        .and_then(|s| str_field(s, "certificate"))
        .or_else(|| str_field(map, "certificate"))
        .filter(|c| !c.trim().is_empty());

    if let Some(message) = str_field(map, "workflowMissingMessage") {
        policy.workflow_missing_message = message;
    }
    if let Some(message) = str_field(map, "timeoutMessage") {
        policy.timeout_message = message;
    }
    let metadata = nested(map, "metadata");
    if let Some(ids) = metadata
        .and_then(|m| m.get("allowedChatIds"))
        .or_else(|| map.get("allowedChatIds"))
        .and_then(Value::as_array)
    {
        policy.allowed_chat_ids = ids
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    policy.updated_at = str_field(map, "updatedAt");
    policy.updated_by = str_field(map, "updatedBy");

    policy
}

/// Serializes a policy into the nested wire layout.
///
/// `botToken` is only included when present; saving without re-entering
/// the token leaves the stored credential untouched.
#[must_use]
pub fn to_wire(policy: &ChannelPolicy) -> Value {
    let mut credential = json!({ "secretToken": policy.secret_token });
    if !policy.bot_token.is_empty() {
        credential["botToken"] = json!(policy.bot_token);
    }
    json!({
        "channel": "telegram",
        "credential": credential,
        "webhookUrl": policy.webhook_url,
        "usePolling": policy.use_polling,
        "locale": policy.locale,
        "workflowMissingMessage": policy.workflow_missing_message,
        "timeoutMessage": policy.timeout_message,
        "metadata": { "allowedChatIds": policy.allowed_chat_ids },
        "rateLimit": {
            "perMinute": policy.rate_limit_per_min,
            "waitForResult": policy.wait_for_result,
        },
        "security": {
            "secretVersion": policy.secret_version,
            "certificate": policy.certificate,
        },
    })
}

/// Editing wrapper around a policy.
///
/// Tracks the token edit mode (the stored token is only shown masked) and
/// keeps a webhook URL backup so switching to polling and back restores
/// the original endpoint.
#[derive(Debug, Clone, Default)]
pub struct PolicyForm {
    pub policy: ChannelPolicy,
    pub dirty: bool,
    token_editing: bool,
    webhook_backup: Option<String>,
}

impl PolicyForm {
    #[must_use]
    pub fn from_policy(policy: ChannelPolicy) -> Self {
        Self {
            policy,
            dirty: false,
            token_editing: false,
            webhook_backup: None,
        }
    }

    /// The token as it should be rendered: plaintext while editing, masked
    /// otherwise.
    #[must_use]
    pub fn display_token(&self) -> String {
        if self.token_editing {
            self.policy.bot_token.clone()
        } else {
            mask_token(&self.policy.bot_token)
        }
    }

    #[must_use]
    pub fn is_editing_token(&self) -> bool {
        self.token_editing
    }

    /// Enters token edit mode with an empty input.
    pub fn begin_token_edit(&mut self) {
        self.token_editing = true;
        self.policy.bot_token.clear();
        self.dirty = true;
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.policy.bot_token = token.into();
        self.dirty = true;
    }

    pub fn set_webhook_url(&mut self, url: impl Into<String>) {
        self.policy.webhook_url = url.into();
        self.dirty = true;
    }

    pub fn set_workflow_missing_message(&mut self, message: impl Into<String>) {
        self.policy.workflow_missing_message = message.into();
        self.dirty = true;
    }

    pub fn set_timeout_message(&mut self, message: impl Into<String>) {
        self.policy.timeout_message = message.into();
        self.dirty = true;
    }

    pub fn set_allowed_chat_ids(&mut self, ids: Vec<String>) {
        self.policy.allowed_chat_ids = ids;
        self.dirty = true;
    }

    /// Toggles polling mode.
    ///
    /// Enabling polling stashes the webhook URL and clears it; disabling
    /// restores the stashed URL.
    pub fn set_use_polling(&mut self, use_polling: bool) {
        if use_polling == self.policy.use_polling {
            return;
        }
        if use_polling {
            self.webhook_backup = Some(std::mem::take(&mut self.policy.webhook_url));
        } else if let Some(backup) = self.webhook_backup.take() {
            self.policy.webhook_url = backup;
        }
        self.policy.use_polling = use_polling;
        self.dirty = true;
    }

    /// Resets edit state after a successful save or a fresh load.
    pub fn settle(&mut self, policy: ChannelPolicy) {
        self.policy = policy;
        self.dirty = false;
        self.token_editing = false;
        self.webhook_backup = None;
    }
}
