//! Edufin Common Types
//!
//! Shared types used by the backend service and its typed client.

pub mod api;
pub mod content;
pub mod plan;
pub mod session;

pub use api::{
    CheckoutRequest, CheckoutResponse, ErrorBody, LogoutRequest, PlanInfo, RefreshRequest,
    SessionResponse, SigninRequest, SigninResponse, SignupRequest, SignupResponse,
    SubscriptionStatus, SuccessResponse, UserProfile,
};
pub use content::{filter_content, ContentItem};
pub use plan::{ParsePlanTierError, PlanTier};
pub use session::Session;
