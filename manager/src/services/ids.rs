//! Task id generation via uuid v4

use shared::TaskId;
use uuid::Uuid;

use crate::traits::TaskIdSource;

/// Production id source: random uuids, collision-free for all practical
/// purposes
pub struct UuidTaskIds;

impl TaskIdSource for UuidTaskIds {
    fn next_id(&self) -> TaskId {
        TaskId::from_string(Uuid::new_v4().to_string())
    }
}
