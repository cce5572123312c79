/// Precondition failures raised by the session coordinator. These are
/// logged (and sometimes answered with an `error` frame) but never tear
/// down the server or the offending session.
#[derive(Debug)]
pub enum CoordinatorError {
    UserNotOnline(String),
    RoomNotFound(String),
    NotInvitee { room_id: String, username: String },
    InviteeUnavailable(String),
    NotInRoom(String),
}

impl std::fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorError::UserNotOnline(who) => write!(f, "user {} not online", who),
            CoordinatorError::RoomNotFound(room_id) => write!(f, "room {} not found", room_id),
            CoordinatorError::NotInvitee { room_id, username } => {
                write!(f, "user {} is not the invitee of room {}", username, room_id)
            }
            CoordinatorError::InviteeUnavailable(who) => {
                write!(f, "user {} is unavailable for an invitation", who)
            }
            CoordinatorError::NotInRoom(who) => write!(f, "user {} is not in any room", who),
        }
    }
}

impl std::error::Error for CoordinatorError {}
