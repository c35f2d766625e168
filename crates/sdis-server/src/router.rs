//! Opcode dispatch table and the declarative authorization gate (spec
//! §4.7, §9 "Dynamic dispatch on opcodes"): one JSON request frame in,
//! one JSON response frame out.

use serde_json::{json, Value};
use uuid::Uuid;

use sdis_proto::Opcode;

use crate::error::{Result, ServerError};
use crate::handlers::{auth, files, groups, notifications};
use crate::state::AppState;

/// Envelope carried in every request frame's JSON payload: the opcode
/// tag plus opcode-specific fields flattened alongside it.
#[derive(Debug, serde::Deserialize)]
pub struct RequestEnvelope {
    pub opcode: Opcode,
    #[serde(flatten)]
    pub data: Value,
}

/// Route one decoded request to its handler, enforcing the
/// authorization table from spec §4.7 before the handler ever runs, and
/// always producing a response envelope (never propagating a protocol
/// error into the JSON layer — those are handled by the caller before
/// reaching here).
pub async fn dispatch(state: &AppState, connection_id: Uuid, request: RequestEnvelope) -> Value {
    let opcode = request.opcode;

    if opcode.requires_session() {
        let session = state.sessions.get(connection_id);
        if !session.map(|s| s.is_authenticated()).unwrap_or(false) {
            return error_response(opcode, ServerError::Authentication.client_message());
        }
    }

    let result = match opcode {
        Opcode::Register => auth::register(state, request.data).await,
        Opcode::Auth => auth::authenticate(state, connection_id, request.data).await,
        Opcode::EmailCode => auth::email_code(state, request.data).await,
        Opcode::PasswordReset => auth::password_reset(state, request.data).await,
        Opcode::GetRecoveryData => auth::get_recovery_data(state, request.data).await,

        Opcode::FileList => files::list(state, connection_id, request.data).await,
        Opcode::FileUploadStart => files::upload_start(state, connection_id, request.data).await,
        Opcode::FileUploadData => files::upload_data(state, connection_id, request.data).await,
        Opcode::FileUploadEnd => files::upload_end(state, connection_id, request.data).await,
        Opcode::FileUploadCancel => files::upload_cancel(state, connection_id, request.data).await,
        Opcode::FileDownloadRequest => files::download_request(state, connection_id, request.data).await,
        Opcode::FileDownloadData => files::download_data(state, connection_id, request.data).await,
        Opcode::FileDelete => files::delete(state, connection_id, request.data).await,
        Opcode::FileRename => files::rename(state, connection_id, request.data).await,
        Opcode::FolderCreate => files::folder_create(state, connection_id, request.data).await,

        Opcode::GroupCreate => groups::create(state, connection_id, request.data).await,
        Opcode::GroupList => groups::list(state, connection_id).await,
        Opcode::GroupInvite => groups::invite(state, connection_id, request.data).await,
        Opcode::GroupJoin => groups::join(state, connection_id, request.data).await,
        Opcode::GroupLeave => groups::leave(state, connection_id, request.data).await,
        Opcode::GroupKey => groups::key(state, connection_id, request.data).await,
        Opcode::GroupMembers => groups::members(state, connection_id, request.data).await,
        Opcode::UserPublicKey => groups::user_public_key(state, request.data).await,

        Opcode::NotificationCount => notifications::count(state, connection_id).await,
        Opcode::NotificationRead => notifications::mark_read(state, connection_id, request.data).await,

        Opcode::Heartbeat => Ok(json!({})),
        Opcode::Error => Ok(json!({})),
    };

    match result {
        Ok(fields) => success_response(opcode, fields),
        Err(err) => {
            tracing::debug!(?opcode, error = %err, "request failed");
            error_response(opcode, err.client_message())
        }
    }
}

fn success_response(opcode: Opcode, mut fields: Value) -> Value {
    if let Value::Object(map) = &mut fields {
        map.insert("opcode".to_string(), json!(opcode));
        map.insert("success".to_string(), json!(true));
        return fields;
    }
    json!({ "opcode": opcode, "success": true })
}

fn error_response(opcode: Opcode, message: &str) -> Value {
    json!({ "opcode": opcode, "success": false, "error": message })
}

/// Pulls a required `Uuid` field out of a request's JSON body.
pub fn require_uuid(data: &Value, field: &str) -> Result<Uuid> {
    data.get(field)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ServerError::NotFound(format!("missing or invalid field `{field}`")))
}

pub fn require_str<'a>(data: &'a Value, field: &str) -> Result<&'a str> {
    data.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ServerError::NotFound(format!("missing field `{field}`")))
}
