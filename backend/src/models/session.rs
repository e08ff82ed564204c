use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::generation::GenerationResult;
use crate::models::image::{EncodedImage, ImageSummary, Slot};

pub const MISSING_INPUTS: &str = "Please upload a person and at least one clothing item.";
pub const MISSING_RESULT: &str = "Generate a try-on image before requesting an edit.";
pub const EMPTY_INSTRUCTION: &str = "Please describe the change you want to make.";
pub const EMPTY_TRY_ON: &str =
    "The AI model did not return an image or text. Please try again with different images.";
pub const EMPTY_REFINE: &str = "The AI model did not return an updated image or text.";
pub const UNKNOWN_TRY_ON_FAILURE: &str = "An unknown error occurred during image generation.";
pub const UNKNOWN_REFINE_FAILURE: &str = "An unknown error occurred during image editing.";
pub const INTERRUPTED: &str = "The request was interrupted before the AI model replied. Please try again.";

/// The two user actions that reach the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    TryOn,
    Refine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Preconditions failed; nothing was sent.
    Validation(String),
    /// The model call failed.
    Transport(String),
    /// The call succeeded but returned neither image nor text.
    EmptyResult(String),
}

impl SessionError {
    pub fn message(&self) -> &str {
        match self {
            SessionError::Validation(m) | SessionError::Transport(m) | SessionError::EmptyResult(m) => m,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Validation(_) => "validation",
            SessionError::Transport(_) => "transport",
            SessionError::EmptyResult(_) => "emptyResult",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Generating,
    Editing,
    Failed(SessionError),
}

impl Phase {
    pub fn is_busy(&self) -> bool {
        matches!(self, Phase::Generating | Phase::Editing)
    }

    fn label(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Generating => "generating",
            Phase::Editing => "editing",
            Phase::Failed(_) => "failed",
        }
    }
}

/// Returned by `begin_*` when no model call should be made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejected {
    /// Another call is in flight; the session was not touched.
    Busy,
    /// Preconditions failed; the session now holds the validation error.
    Invalid(SessionError),
}

#[derive(Debug, Clone)]
pub struct TryOnInputs {
    pub subject: EncodedImage,
    pub garments: Vec<EncodedImage>,
}

#[derive(Debug, Clone)]
pub struct RefineInputs {
    pub prior: EncodedImage,
    pub instruction: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub image: EncodedImage,
    pub generated_at: DateTime<Utc>,
    pub source: Action,
}

#[derive(Debug, Default)]
pub struct TryOnSession {
    subject: Option<EncodedImage>,
    garments: [Option<EncodedImage>; 2],
    result: Option<GeneratedImage>,
    commentary: Option<String>,
    phase: Phase,
}

impl TryOnSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn result(&self) -> Option<&GeneratedImage> {
        self.result.as_ref()
    }

    pub fn commentary(&self) -> Option<&str> {
        self.commentary.as_deref()
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Option<EncodedImage> {
        match slot {
            Slot::Subject => &mut self.subject,
            Slot::Garment1 => &mut self.garments[0],
            Slot::Garment2 => &mut self.garments[1],
        }
    }

    /// Replaces the image in `slot`. Allowed while a call is in flight; the call
    /// already owns copies of its inputs.
    pub fn set_image(&mut self, slot: Slot, image: EncodedImage) {
        *self.slot_mut(slot) = Some(image);
    }

    pub fn clear_image(&mut self, slot: Slot) -> bool {
        self.slot_mut(slot).take().is_some()
    }

    pub fn can_try_on(&self) -> bool {
        !self.phase().is_busy() && self.subject.is_some() && self.garments.iter().any(Option::is_some)
    }

    pub fn can_refine(&self) -> bool {
        !self.phase().is_busy() && self.result.is_some()
    }

    fn fail(&mut self, error: SessionError) -> Rejected {
        self.phase = Phase::Failed(error.clone());
        Rejected::Invalid(error)
    }

    pub fn begin_try_on(&mut self) -> Result<TryOnInputs, Rejected> {
        if self.phase().is_busy() {
            return Err(Rejected::Busy);
        }

        let garments: Vec<EncodedImage> = self.garments.iter().flatten().cloned().collect();
        let subject = match (&self.subject, garments.is_empty()) {
            (Some(subject), false) => subject.clone(),
            _ => return Err(self.fail(SessionError::Validation(MISSING_INPUTS.to_string()))),
        };

        self.phase = Phase::Generating;
        self.result = None;
        self.commentary = None;

        Ok(TryOnInputs { subject, garments })
    }

    pub fn begin_refine(&mut self, instruction: &str) -> Result<RefineInputs, Rejected> {
        if self.phase().is_busy() {
            return Err(Rejected::Busy);
        }

        let Some(prior) = self.result.as_ref().map(|r| r.image.clone()) else {
            return Err(self.fail(SessionError::Validation(MISSING_RESULT.to_string())));
        };

        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(self.fail(SessionError::Validation(EMPTY_INSTRUCTION.to_string())));
        }

        self.phase = Phase::Editing;

        Ok(RefineInputs {
            prior,
            instruction: instruction.to_string(),
        })
    }

    /// Applies the outcome of the call started by `begin_*`. Returns false if
    /// the session was not waiting on `action`.
    pub fn complete(&mut self, action: Action, outcome: Result<GenerationResult, String>) -> bool {
        let expected = match action {
            Action::TryOn => Phase::Generating,
            Action::Refine => Phase::Editing,
        };
        if *self.phase() != expected {
            return false;
        }

        let next = match outcome {
            Ok(result) if result.is_empty() => Phase::Failed(SessionError::EmptyResult(
                match action {
                    Action::TryOn => EMPTY_TRY_ON,
                    Action::Refine => EMPTY_REFINE,
                }
                .to_string(),
            )),
            Ok(GenerationResult { image, text }) => {
                if let Some(image) = image {
                    self.result = Some(GeneratedImage {
                        image,
                        generated_at: Utc::now(),
                        source: action,
                    });
                }
                // Commentary persists across edits unless the model sends new text.
                if let Some(text) = text {
                    self.commentary = Some(text);
                }
                Phase::Idle
            }
            Err(message) => {
                let message = if message.trim().is_empty() {
                    match action {
                        Action::TryOn => UNKNOWN_TRY_ON_FAILURE,
                        Action::Refine => UNKNOWN_REFINE_FAILURE,
                    }
                    .to_string()
                } else {
                    message
                };
                Phase::Failed(SessionError::Transport(message))
            }
        };

        self.phase = next;
        true
    }

    pub fn reset(&mut self) -> Result<(), Rejected> {
        if self.phase().is_busy() {
            return Err(Rejected::Busy);
        }
        *self = Self::default();
        Ok(())
    }

    pub fn view(&self) -> SessionView {
        let error = match self.phase() {
            Phase::Failed(e) => Some(e),
            _ => None,
        };

        SessionView {
            status: self.phase().label(),
            error: error.map(|e| e.message().to_string()),
            error_kind: error.map(SessionError::kind),
            slots: SlotsView {
                subject: self.subject.as_ref().map(EncodedImage::summary),
                garment1: self.garments[0].as_ref().map(EncodedImage::summary),
                garment2: self.garments[1].as_ref().map(EncodedImage::summary),
            },
            has_result: self.result.is_some(),
            result: self.result.as_ref().map(|r| ResultView {
                mime_type: r.image.mime_type.clone(),
                size_bytes: r.image.bytes.len() as u64,
                generated_at: r.generated_at.to_rfc3339(),
                source: r.source,
            }),
            commentary: self.commentary().map(str::to_string),
            can_try_on: self.can_try_on(),
            can_refine: self.can_refine(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub status: &'static str,
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
    pub slots: SlotsView,
    pub has_result: bool,
    pub result: Option<ResultView>,
    pub commentary: Option<String>,
    pub can_try_on: bool,
    pub can_refine: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotsView {
    pub subject: Option<ImageSummary>,
    #[serde(rename = "garment-1")]
    pub garment1: Option<ImageSummary>,
    #[serde(rename = "garment-2")]
    pub garment2: Option<ImageSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultView {
    pub mime_type: String,
    pub size_bytes: u64,
    pub generated_at: String,
    pub source: Action,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(tag: &[u8]) -> EncodedImage {
        EncodedImage::new(tag.to_vec(), "image/png")
    }

    fn ready_session() -> TryOnSession {
        let mut session = TryOnSession::new();
        session.set_image(Slot::Subject, img(b"me"));
        session.set_image(Slot::Garment1, img(b"shirt"));
        session
    }

    fn with_result(bytes: &[u8], text: Option<&str>) -> TryOnSession {
        let mut session = ready_session();
        session.begin_try_on().unwrap();
        assert!(session.complete(
            Action::TryOn,
            Ok(GenerationResult {
                image: Some(img(bytes)),
                text: text.map(str::to_string),
            })
        ));
        session
    }

    #[test]
    fn try_on_requires_subject_and_garment() {
        let mut session = TryOnSession::new();
        session.set_image(Slot::Garment1, img(b"shirt"));
        let rejected = session.begin_try_on().unwrap_err();
        assert_eq!(
            rejected,
            Rejected::Invalid(SessionError::Validation(MISSING_INPUTS.to_string()))
        );
        assert_eq!(session.view().error_kind, Some("validation"));

        let mut session = TryOnSession::new();
        session.set_image(Slot::Subject, img(b"me"));
        assert!(matches!(session.begin_try_on(), Err(Rejected::Invalid(_))));
    }

    #[test]
    fn second_garment_slot_alone_is_enough() {
        let mut session = TryOnSession::new();
        session.set_image(Slot::Subject, img(b"me"));
        session.set_image(Slot::Garment2, img(b"jacket"));
        let inputs = session.begin_try_on().unwrap();
        assert_eq!(inputs.garments, vec![img(b"jacket")]);
    }

    #[test]
    fn garments_keep_slot_order() {
        let mut session = ready_session();
        session.set_image(Slot::Garment2, img(b"jacket"));
        let inputs = session.begin_try_on().unwrap();
        assert_eq!(inputs.subject, img(b"me"));
        assert_eq!(inputs.garments, vec![img(b"shirt"), img(b"jacket")]);
        assert_eq!(*session.phase(), Phase::Generating);
    }

    #[test]
    fn starting_try_on_clears_previous_result_and_error() {
        let mut session = with_result(b"B1", Some("Looks great"));
        session.begin_refine("  ").unwrap_err();
        assert!(matches!(session.phase(), Phase::Failed(_)));

        session.begin_try_on().unwrap();
        assert!(session.result().is_none());
        assert!(session.commentary().is_none());
        assert_eq!(session.view().error, None);
    }

    #[test]
    fn triggers_while_busy_are_no_ops() {
        let mut session = with_result(b"B1", None);
        session.begin_refine("make it red").unwrap();

        assert_eq!(session.begin_try_on().unwrap_err(), Rejected::Busy);
        assert_eq!(session.begin_refine("again").unwrap_err(), Rejected::Busy);
        assert_eq!(session.reset().unwrap_err(), Rejected::Busy);
        assert_eq!(*session.phase(), Phase::Editing);
        assert_eq!(session.result().unwrap().image, img(b"B1"));
    }

    #[test]
    fn refine_requires_result_and_instruction() {
        let mut session = ready_session();
        assert_eq!(
            session.begin_refine("make it red").unwrap_err(),
            Rejected::Invalid(SessionError::Validation(MISSING_RESULT.to_string()))
        );

        let mut session = with_result(b"B1", Some("hi"));
        assert_eq!(
            session.begin_refine(" \t\n").unwrap_err(),
            Rejected::Invalid(SessionError::Validation(EMPTY_INSTRUCTION.to_string()))
        );
        assert_eq!(session.result().unwrap().image, img(b"B1"));
        assert_eq!(session.commentary(), Some("hi"));
    }

    #[test]
    fn refine_uses_current_result_and_trims_instruction() {
        let mut session = with_result(b"B1", None);
        let inputs = session.begin_refine("  make it red ").unwrap();
        assert_eq!(inputs.prior, img(b"B1"));
        assert_eq!(inputs.instruction, "make it red");
    }

    #[test]
    fn successful_edit_without_text_keeps_commentary() {
        let mut session = with_result(b"B1", Some("Looks great"));
        session.begin_refine("make it red").unwrap();
        session.complete(
            Action::Refine,
            Ok(GenerationResult {
                image: Some(img(b"B2")),
                text: None,
            }),
        );

        let result = session.result().unwrap();
        assert_eq!(result.image, img(b"B2"));
        assert_eq!(result.source, Action::Refine);
        assert_eq!(session.commentary(), Some("Looks great"));
        assert_eq!(*session.phase(), Phase::Idle);
    }

    #[test]
    fn text_only_reply_keeps_previous_image() {
        let mut session = with_result(b"B1", None);
        session.begin_refine("why?").unwrap();
        session.complete(
            Action::Refine,
            Ok(GenerationResult {
                image: None,
                text: Some("Because.".to_string()),
            }),
        );
        assert_eq!(session.result().unwrap().image, img(b"B1"));
        assert_eq!(session.commentary(), Some("Because."));
    }

    #[test]
    fn empty_reply_is_surfaced() {
        let mut session = ready_session();
        session.begin_try_on().unwrap();
        session.complete(Action::TryOn, Ok(GenerationResult::default()));
        assert_eq!(
            *session.phase(),
            Phase::Failed(SessionError::EmptyResult(EMPTY_TRY_ON.to_string()))
        );

        let mut session = with_result(b"B1", None);
        session.begin_refine("brighter").unwrap();
        session.complete(Action::Refine, Ok(GenerationResult::default()));
        assert_eq!(session.view().error.as_deref(), Some(EMPTY_REFINE));
        assert_eq!(session.result().unwrap().image, img(b"B1"));
    }

    #[test]
    fn transport_failure_on_refine_keeps_result() {
        let mut session = with_result(b"B1", Some("Looks great"));
        session.begin_refine("make it red").unwrap();
        session.complete(Action::Refine, Err("Failed to edit virtual try-on image.".to_string()));

        assert_eq!(session.result().unwrap().image, img(b"B1"));
        assert_eq!(session.commentary(), Some("Looks great"));
        let view = session.view();
        assert_eq!(view.status, "failed");
        assert_eq!(view.error_kind, Some("transport"));
        assert_eq!(view.error.as_deref(), Some("Failed to edit virtual try-on image."));
        assert!(view.can_refine);
    }

    #[test]
    fn blank_failure_message_falls_back() {
        let mut session = ready_session();
        session.begin_try_on().unwrap();
        session.complete(Action::TryOn, Err(String::new()));
        assert_eq!(session.view().error.as_deref(), Some(UNKNOWN_TRY_ON_FAILURE));
    }

    #[test]
    fn stray_completion_is_ignored() {
        let mut session = ready_session();
        assert!(!session.complete(Action::TryOn, Ok(GenerationResult::default())));
        session.begin_try_on().unwrap();
        assert!(!session.complete(Action::Refine, Ok(GenerationResult::default())));
        assert_eq!(*session.phase(), Phase::Generating);
    }

    #[test]
    fn reset_drops_everything() {
        let mut session = with_result(b"B1", Some("hi"));
        session.reset().unwrap();
        let view = session.view();
        assert_eq!(view.status, "idle");
        assert!(!view.has_result);
        assert!(view.slots.subject.is_none());
        assert!(view.commentary.is_none());
    }

    #[test]
    fn view_serializes_camel_case() {
        let session = with_result(b"B1", Some("Looks great"));
        let value = serde_json::to_value(session.view()).unwrap();
        assert_eq!(value["status"], "idle");
        assert_eq!(value["hasResult"], true);
        assert_eq!(value["commentary"], "Looks great");
        assert_eq!(value["result"]["source"], "try-on");
        assert_eq!(value["slots"]["garment-1"]["sizeBytes"], 5);
        assert_eq!(value["canTryOn"], true);
    }
}
