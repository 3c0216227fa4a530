//! One encoder run tied to one request.

use std::any::Any;
use std::path::PathBuf;
use std::thread::JoinHandle;

use tracing::debug;
use tracing::warn;

use crate::CancelScope;
use crate::EncodeReport;
use crate::NemuError;
use crate::ProgressCallback;
use crate::Result;
use crate::encode::encode_tree;
use crate::pipe::PipeHandle;
use crate::pipe::PipeReader;
use crate::pipe::pipe;

/// Owns the encoder thread, the session scope and the read side's close
/// handle. Dropping a session cancels its scope and joins the encoder, so
/// no thread outlives the call that started it.
pub(crate) struct Session {
    scope: CancelScope,
    read_handle: PipeHandle,
    encoder: Option<JoinHandle<Result<EncodeReport>>>,
}

impl Session {
    /// Starts the encoder on its own thread and returns the session with the
    /// pipe's read side, to be used as the request body.
    pub(crate) fn start(
        source: PathBuf,
        parent: &CancelScope,
        mut progress: Box<dyn ProgressCallback>,
    ) -> Result<(Self, PipeReader)> {
        let scope = parent.child();
        let (reader, writer) = pipe(&scope);
        let read_handle = reader.handle();

        let encoder_scope = scope.clone();
        let encoder = std::thread::Builder::new()
            .name("nemu-encoder".into())
            .spawn(move || encode_tree(&source, writer, &encoder_scope, progress.as_mut()))?;

        let session = Self {
            scope,
            read_handle,
            encoder: Some(encoder),
        };
        Ok((session, reader))
    }

    pub(crate) fn scope(&self) -> &CancelScope {
        &self.scope
    }

    /// Ends the session after the request failed with `cause`.
    ///
    /// Cancels the scope, closes the read side so a blocked encoder wakes up,
    /// waits for it and folds its outcome into the returned error.
    pub(crate) fn fail(mut self, cause: NemuError) -> NemuError {
        debug!(error = %cause, "transfer failed, stopping encoder");
        self.scope.cancel();
        self.read_handle.close_read(cause.to_string());
        combine_failure(cause, self.join())
    }

    /// Ends the session after the request was accepted.
    ///
    /// The encoder may still fail while closing its stream even though the
    /// receiver accepted every byte; such a failure is returned unless it is
    /// just the echo of the request having finished first.
    pub(crate) fn finish(mut self) -> Result<EncodeReport> {
        self.read_handle.close_read("request completed");
        combine_success(self.join())
    }

    fn join(&mut self) -> Result<EncodeReport> {
        let Some(handle) = self.encoder.take() else {
            return Err(NemuError::Cancelled);
        };
        handle
            .join()
            .map_err(|payload| NemuError::EncoderPanic(panic_message(payload.as_ref())))?
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.scope.cancel();
        if self.encoder.is_some() {
            self.read_handle.close_read("transfer session dropped");
            if let Err(err) = self.join()
                && !err.is_expected_shutdown()
            {
                warn!(error = %err, "encoder failed after session was dropped");
            }
        }
    }
}

/// Combines the request failure with the encoder's final status.
///
/// Cancellation and a closed pipe are consequences of `cause`, not
/// independent failures, so they are dropped.
pub(crate) fn combine_failure(cause: NemuError, encoder: Result<EncodeReport>) -> NemuError {
    match encoder {
        Err(err) if !err.is_expected_shutdown() => NemuError::Transfer {
            cause: Box::new(cause),
            encoder: Box::new(err),
        },
        _ => cause,
    }
}

/// Settles the encoder's final status after an accepted request.
///
/// An encoder that stopped because the request finished first is tolerated
/// with an empty report; any other failure is escalated.
pub(crate) fn combine_success(encoder: Result<EncodeReport>) -> Result<EncodeReport> {
    match encoder {
        Ok(report) => Ok(report),
        Err(err) if err.is_expected_shutdown() => {
            debug!(error = %err, "encoder stopped after request completed");
            Ok(EncodeReport::default())
        }
        Err(err) => Err(NemuError::EncoderAfterSuccess(Box::new(err))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
