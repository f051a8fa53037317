//! Network Worker
//!
//! Background task that owns the transport. Jobs run strictly in the order
//! they were queued and each result is posted back to the app loop.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use tictactoe::network::protocol::{Request, Response};

use crate::app::AppEvent;
use crate::command::PendingCall;
use crate::network::transport::{TransportClient, TransportError};

/// A request plus what to do with its answer.
#[derive(Debug)]
pub struct NetworkJob {
    /// Request to send.
    pub request: Request,
    /// Continuation tag.
    pub call: PendingCall,
}

/// A finished job.
#[derive(Debug)]
pub struct Completion {
    /// Continuation tag from the job.
    pub call: PendingCall,
    /// Raw outcome of the round-trip.
    pub result: Result<Response, TransportError>,
}

/// Start the worker. It stops and closes the transport once every job
/// sender is dropped or the app loop is gone.
pub fn spawn_worker(
    transport: TransportClient,
    jobs: mpsc::UnboundedReceiver<NetworkJob>,
    events: mpsc::UnboundedSender<AppEvent>,
) -> JoinHandle<()> {
    tokio::spawn(run_worker(transport, jobs, events))
}

async fn run_worker(
    mut transport: TransportClient,
    mut jobs: mpsc::UnboundedReceiver<NetworkJob>,
    events: mpsc::UnboundedSender<AppEvent>,
) {
    while let Some(NetworkJob { request, call }) = jobs.recv().await {
        let result = transport.send_request(request).await;
        if events.send(AppEvent::Completed(Completion { call, result })).is_err() {
            break;
        }
    }

    transport.close().await;
    debug!("Network worker stopped");
}
