use anyhow::Result;
use rota_core::User;
use tracing::debug;

use crate::RotationView;

/// Pick the next user in rotation.
///
/// Rotation order is the ascending id order of whoever is active right now,
/// anchored on the user named by the most recent `ok` mission. Nothing else
/// is stored, so users joining, leaving or being toggled between calls shift
/// the rotation immediately.
///
/// - no prior mission, or a mission with no assignee: first active user
/// - assignee no longer exists: first active user
/// - assignee exists (active or not): first active user with a higher id,
///   wrapping to the first active user when there is none
///
/// Returns `None` only when no user is active.
pub fn next_user<V: RotationView + ?Sized>(store: &V) -> Result<Option<User>> {
    let Some(last) = store.most_recent_assignment()? else {
        return store.first_active_user();
    };
    if last.user_name.is_empty() {
        return store.first_active_user();
    }

    let candidate = match store.user_by_name(&last.user_name)? {
        Some(anchor) => store.first_active_user_after(anchor.id)?,
        None => {
            debug!(user = %last.user_name, "last assignee no longer exists");
            None
        }
    };

    match candidate {
        Some(user) => Ok(Some(user)),
        None => store.first_active_user(),
    }
}
