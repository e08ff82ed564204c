use parking_lot::Mutex;
use tracing::{info, warn};

use crate::models::error::AppError;
use crate::models::generation::GenerationResult;
use crate::models::image::{EncodedImage, Slot};
use crate::models::session::{
    Action, GeneratedImage, Rejected, SessionView, TryOnSession, INTERRUPTED,
};
use crate::services::translator::Translator;

/// Owns the try-on session and drives one model call per user action.
///
/// The session lock is never held across an await: inputs are cloned out under
/// the lock, the call runs unlocked, and the outcome is applied under the lock
/// again. The session phase makes a second trigger during a call a no-op.
pub struct Studio {
    session: Mutex<TryOnSession>,
    translator: Translator,
}

impl Studio {
    pub fn new(translator: Translator) -> Self {
        Self {
            session: Mutex::new(TryOnSession::new()),
            translator,
        }
    }

    pub fn view(&self) -> SessionView {
        self.session.lock().view()
    }

    pub fn set_image(&self, slot: Slot, image: EncodedImage) -> SessionView {
        info!(slot = %slot, mime = %image.mime_type, size = image.bytes.len(), "Image stored");
        let mut session = self.session.lock();
        session.set_image(slot, image);
        session.view()
    }

    pub fn clear_image(&self, slot: Slot) -> SessionView {
        let mut session = self.session.lock();
        if session.clear_image(slot) {
            info!(slot = %slot, "Image cleared");
        }
        session.view()
    }

    pub fn result(&self) -> Option<GeneratedImage> {
        self.session.lock().result().cloned()
    }

    pub fn reset(&self) -> Result<SessionView, AppError> {
        let mut session = self.session.lock();
        session.reset().map_err(|_| AppError::Busy)?;
        info!("Session reset");
        Ok(session.view())
    }

    pub async fn try_on(&self) -> Result<SessionView, AppError> {
        let begun = self.session.lock().begin_try_on();
        let inputs = match begun {
            Ok(inputs) => inputs,
            Err(rejected) => return self.rejected(Action::TryOn, rejected),
        };

        let in_flight = InFlight::new(self, Action::TryOn);
        info!(garments = inputs.garments.len(), "Starting try-on");
        let outcome = self
            .translator
            .initiate(&inputs.subject, &inputs.garments)
            .await
            .map_err(|e| e.to_string());

        Ok(in_flight.finish(outcome))
    }

    pub async fn refine(&self, instruction: &str) -> Result<SessionView, AppError> {
        let begun = self.session.lock().begin_refine(instruction);
        let inputs = match begun {
            Ok(inputs) => inputs,
            Err(rejected) => return self.rejected(Action::Refine, rejected),
        };

        let in_flight = InFlight::new(self, Action::Refine);
        info!(instruction_len = inputs.instruction.len(), "Starting edit");
        let outcome = self
            .translator
            .refine(&inputs.prior, &inputs.instruction)
            .await
            .map_err(|e| e.to_string());

        Ok(in_flight.finish(outcome))
    }

    fn rejected(&self, action: Action, rejected: Rejected) -> Result<SessionView, AppError> {
        match rejected {
            Rejected::Busy => {
                warn!(action = ?action, "Ignoring request while another call is in flight");
                Err(AppError::Busy)
            }
            Rejected::Invalid(error) => {
                info!(action = ?action, reason = %error.message(), "Request failed validation");
                Ok(self.view())
            }
        }
    }

    fn finish(&self, action: Action, outcome: Result<GenerationResult, String>) -> SessionView {
        let mut session = self.session.lock();
        if !session.complete(action, outcome) {
            warn!(action = ?action, "Dropped a completion the session was not waiting for");
        }
        let view = session.view();
        info!(action = ?action, status = view.status, has_result = view.has_result, "Call finished");
        view
    }
}

/// A model call that has been started on the session.
///
/// If the future driving the call is dropped (client disconnect, server
/// shutdown) the call is settled as failed, so the session never stays busy.
struct InFlight<'a> {
    studio: &'a Studio,
    action: Action,
    settled: bool,
}

impl<'a> InFlight<'a> {
    fn new(studio: &'a Studio, action: Action) -> Self {
        Self {
            studio,
            action,
            settled: false,
        }
    }

    fn finish(mut self, outcome: Result<GenerationResult, String>) -> SessionView {
        self.settled = true;
        self.studio.finish(self.action, outcome)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(action = ?self.action, "Call dropped before the model replied");
        self.studio
            .session
            .lock()
            .complete(self.action, Err(INTERRUPTED.to_string()));
    }
}
