//! Root navigation choice.
//!
//! The render layer shows exactly one of three root stacks, chosen from the
//! session alone. While the session is loading the user is not final, so
//! the loading screen wins regardless of `user`.

use serde::Serialize;

use crate::session::Session;

const AUTHENTICATED_SCREENS: &[&str] = &["dashboard", "CreateProduct", "demo"];
const GUEST_SCREENS: &[&str] = &["home", "login", "signup"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RootStack {
    /// Full-screen loading indicator.
    Loading,
    Authenticated,
    Guest,
}

impl RootStack {
    pub fn choose(session: &Session) -> Self {
        if session.loading {
            RootStack::Loading
        } else if session.user.is_some() {
            RootStack::Authenticated
        } else {
            RootStack::Guest
        }
    }

    /// Screens registered in this stack, in registration order.
    pub fn screens(self) -> &'static [&'static str] {
        match self {
            RootStack::Loading => &[],
            RootStack::Authenticated => AUTHENTICATED_SCREENS,
            RootStack::Guest => GUEST_SCREENS,
        }
    }

    /// The first registered screen is the one shown on entry.
    pub fn initial_route(self) -> Option<&'static str> {
        self.screens().first().copied()
    }

    pub fn contains(self, screen: &str) -> bool {
        self.screens().contains(&screen)
    }
}
