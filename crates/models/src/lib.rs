// Core modules
pub mod audit;
pub mod principal;
pub mod role;
pub mod second_factor;
pub mod session;

// Re-export commonly used types
pub use audit::{
    AuditSink, SecurityEvent, SecurityEventBuilder, SecurityEventKind, SecurityOutcome,
    TracingAuditSink,
};
pub use principal::AuthenticatedPrincipal;
pub use role::{Permission, RolePermissionTable};
pub use second_factor::{
    SecondFactorMethod, SecondFactorProfile, SecondFactorStatus, SmsFactor, SmsOtpChallenge,
    TotpState,
};
pub use session::{NewSession, Session, SessionSummary};
