use crate::core::models::User;

pub const ROOT_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";
pub const SIGNUP_PATH: &str = "/signup";

/// Paths reachable without a session.
pub const PUBLIC_PATHS: &[&str] = &[LOGIN_PATH, SIGNUP_PATH];

/// Navigation descriptor handed to the guard by the hosting framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route<'a> {
    pub path: &'a str,
}

impl<'a> Route<'a> {
    pub fn new(path: &'a str) -> Self {
        Self { path }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    /// `full_reload` asks for a document load instead of a client-side transition.
    Redirect { to: String, full_reload: bool },
}

impl Navigation {
    pub fn redirect(to: &str) -> Self {
        Navigation::Redirect {
            to: to.to_string(),
            full_reload: false,
        }
    }

    pub fn reload(to: &str) -> Self {
        Navigation::Redirect {
            to: to.to_string(),
            full_reload: true,
        }
    }
}

pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

/// Sends anonymous visitors of protected paths to the login page.
pub fn guard(to: &Route<'_>, _from: &Route<'_>, user: Option<&User>) -> Navigation {
    if user.is_none() && !is_public(to.path) {
        return Navigation::redirect(LOGIN_PATH);
    }
    Navigation::Proceed
}
