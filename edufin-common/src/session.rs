//! Client-side session state.

use crate::api::{SigninResponse, UserProfile};

/// Credentials a client holds between requests.
///
/// `Anonymous -> Authenticated` on a successful sign-in or refresh;
/// back to `Anonymous` on logout, expiry or an invalid-token answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated {
        token: String,
        refresh_token: String,
        user: UserProfile,
    },
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }

    /// Access token to send as `Authorization: Bearer`.
    pub fn bearer(&self) -> Option<&str> {
        match self {
            Session::Authenticated { token, .. } => Some(token),
            Session::Anonymous => None,
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            Session::Authenticated { refresh_token, .. } => Some(refresh_token),
            Session::Anonymous => None,
        }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            Session::Authenticated { user, .. } => Some(user),
            Session::Anonymous => None,
        }
    }

    pub fn establish(&mut self, response: SigninResponse) {
        *self = Session::Authenticated {
            token: response.token,
            refresh_token: response.refresh_token,
            user: response.user,
        };
    }

    pub fn clear(&mut self) {
        *self = Session::Anonymous;
    }
}
