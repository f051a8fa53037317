//! Typed views of responses.
//!
//! A FAILURE status becomes `ClientError::Protocol` with the server's
//! message; a payload of the wrong kind is a protocol error too.

use tictactoe::network::protocol::{Event, MoveUpdate, PairingSnapshot, Response, ResponsePayload, User};

use crate::error::ClientError;
use crate::network::transport::TransportError;

/// Raw result of a round-trip.
pub type RawResult = Result<Response, TransportError>;

fn payload(result: RawResult) -> Result<ResponsePayload, ClientError> {
    let response = result?;
    if !response.is_success() {
        let message = response.message.unwrap_or_else(|| "Request failed".to_string());
        return Err(ClientError::Protocol(message));
    }
    Ok(response.payload)
}

fn unexpected(expected: &str, got: &ResponsePayload) -> ClientError {
    ClientError::Protocol(format!("Expected {} payload, got {:?}", expected, got))
}

/// UPDATE_PAIRING result.
pub fn pairing(result: RawResult) -> Result<PairingSnapshot, ClientError> {
    match payload(result)? {
        ResponsePayload::Pairing(snapshot) => Ok(snapshot),
        other => Err(unexpected("pairing", &other)),
    }
}

/// SEND/ACCEPT/DECLINE_INVITATION and ACKNOWLEDGE_RESPONSE result.
pub fn event(result: RawResult) -> Result<Event, ClientError> {
    match payload(result)? {
        ResponsePayload::Event(event) => Ok(event),
        other => Err(unexpected("event", &other)),
    }
}

/// REQUEST_MOVE result.
pub fn move_update(result: RawResult) -> Result<MoveUpdate, ClientError> {
    match payload(result)? {
        ResponsePayload::Move(update) => Ok(update),
        other => Err(unexpected("move", &other)),
    }
}

/// LOGIN/REGISTER result.
pub fn user(result: RawResult) -> Result<User, ClientError> {
    match payload(result)? {
        ResponsePayload::User(user) => Ok(user),
        other => Err(unexpected("user", &other)),
    }
}

/// Result of a request whose payload does not matter.
pub fn empty(result: RawResult) -> Result<(), ClientError> {
    payload(result).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tictactoe::game::board::Move;

    #[test]
    fn test_failure_message_is_verbatim() {
        let err = pairing(Ok(Response::failure(3, "User bob is not available"))).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ref m) if m == "User bob is not available"));
    }

    #[test]
    fn test_wrong_payload_kind() {
        let update = MoveUpdate { mv: Some(Move::new(0, 0)), active: true };
        let err = event(Ok(Response::success(1, ResponsePayload::Move(update)))).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_transport_error_passes_through() {
        let err = empty(Err(TransportError::Closed)).unwrap_err();
        assert!(err.is_connection_lost());
    }

    #[test]
    fn test_move_update() {
        let update = MoveUpdate { mv: None, active: false };
        let decoded = move_update(Ok(Response::success(1, ResponsePayload::Move(update)))).unwrap();
        assert_eq!(decoded, update);
    }
}
