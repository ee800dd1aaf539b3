//! The seam between the session protocol and the application.

use dicelog_protocol::DiscordCommand;
use dicelog_session::IdentityId;

/// Executes an authenticated command and produces the text reply.
///
/// The server calls this once per well-formed `DiscordCommand` after the
/// token has been checked and the connection binding confirmed. The
/// returned text becomes `commandResponse`. Implementations must not fail:
/// problems are reported inside the text.
///
/// # Example
///
/// ```rust
/// use dicelog::CommandExecutor;
/// use dicelog_protocol::DiscordCommand;
/// use dicelog_session::IdentityId;
///
/// struct Echo;
///
/// impl CommandExecutor for Echo {
///     fn execute(&self, _identity: IdentityId, command: &DiscordCommand) -> String {
///         command.interaction_data.clone()
///     }
/// }
/// ```
pub trait CommandExecutor: Send + Sync + 'static {
    fn execute(&self, identity: IdentityId, command: &DiscordCommand) -> String;
}
