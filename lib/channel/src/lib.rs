//! Telegram channel policy management: validation, the test-send
//! throttle, health polling, and the webhook security gate.

pub mod controller;
pub mod error;
pub mod health;
pub mod policy;
pub mod security;
pub mod throttle;

pub use controller::{
    ChannelGateway, ChannelPolicyController, ChannelSnapshot, ChannelWatch, HttpChannelGateway,
    SecurityProbeRequest, TestOutcome, TestSendRequest,
};
pub use error::ChannelError;
pub use health::{
    next_interval, HealthConfig, HealthObserver, HealthProbe, HealthReport, HealthScheduler,
    HealthState, HealthStatus,
};
pub use policy::{
    from_wire, mask_token, to_wire, token_format_ok, validate, validate_test_message,
    ChannelPolicy, PolicyForm, DEFAULT_LOCALE, DEFAULT_RATE_LIMIT, TEST_MESSAGE_MAX_CHARS,
};
pub use security::{requires_retest, CertificateCheck, SecretCheck, SecuritySnapshot};
pub use throttle::{TestRecord, ThrottleLedger, HISTORY_CAP, MAX_ATTEMPTS, WINDOW_MS};
