//! Request/response opcode catalog (spec §6). Every opcode is carried in
//! a `Request`/`Response` frame's JSON payload as an `"opcode"` field
//! rather than a header byte, so adding an opcode never changes the
//! wire framing.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    Register,
    Auth,
    EmailCode,
    PasswordReset,
    GetRecoveryData,

    FileList,
    FileUploadStart,
    FileUploadData,
    FileUploadEnd,
    FileUploadCancel,
    FileDownloadRequest,
    FileDownloadData,
    FileDelete,
    FileRename,
    FolderCreate,

    GroupCreate,
    GroupList,
    GroupInvite,
    GroupJoin,
    GroupLeave,
    GroupKey,
    GroupMembers,

    UserPublicKey,

    NotificationCount,
    NotificationRead,

    Heartbeat,
    Error,
}

impl Opcode {
    /// Whether a session must already carry a bound `user_id` to call
    /// this opcode (spec §4.7). The remaining authorization checks —
    /// ownership, group membership, invitation identity — are evaluated
    /// per-request against the payload, not statically here.
    pub fn requires_session(self) -> bool {
        !matches!(
            self,
            Opcode::Register
                | Opcode::EmailCode
                | Opcode::Auth
                | Opcode::PasswordReset
                | Opcode::GetRecoveryData
                | Opcode::Heartbeat
        )
    }
}
