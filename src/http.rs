//! Shared HTTP-adjacent types used by both the git command wrapper and the tracker
//! and code host clients.

use crate::ext::secrecy::ComparableSecretString;

/// Credentials attached to an outgoing request or a shelled-out `git` invocation.
#[derive(Debug, Clone)]
pub enum Auth {
    /// Send the secret as the value of an HTTP header (commonly `Authorization: Bearer <token>`).
    Header(ComparableSecretString),

    /// Send the secret as HTTP basic auth, e.g. embedded in a git remote URL.
    Basic {
        /// The basic auth username.
        username: String,
        /// The basic auth password or token.
        password: ComparableSecretString,
    },
}
