//! Owning wrapper around a matched recognizer and its decoded value.

use super::FormatRecognizer;
use crate::entity::Entity;
use crate::error::{AnalysisError, Result};
use std::fmt;
use std::sync::Arc;

type Deferred = Box<dyn FnOnce() -> Result<Entity> + Send>;

enum ValueState {
    Pending(Deferred),
    Ready(Box<Entity>),
    Released,
}

/// Value produced by a successful decode: ready, or deferred until first use.
pub struct Decoded {
    state: ValueState,
    media_type: Option<String>,
    extension: Option<String>,
}

impl Decoded {
    /// An already decoded entity.
    pub fn ready(entity: Entity) -> Self {
        Self {
            state: ValueState::Ready(Box::new(entity)),
            media_type: None,
            extension: None,
        }
    }

    /// An entity decoded on first access.
    pub fn deferred(decode: impl FnOnce() -> Result<Entity> + Send + 'static) -> Self {
        Self {
            state: ValueState::Pending(Box::new(decode)),
            media_type: None,
            extension: None,
        }
    }

    /// Refine the recognizer's media type.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Refine the recognizer's extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }
}

/// A matched format and its decoded value.
///
/// The value is decoded at most once and released exactly once: on
/// [`FormatObject::dispose`] or when the object is dropped, whichever comes
/// first. Access after release fails with [`AnalysisError::Disposed`].
pub struct FormatObject {
    recognizer: Arc<dyn FormatRecognizer>,
    state: ValueState,
    media_type: Option<String>,
    extension: Option<String>,
}

impl FormatObject {
    /// Wrap the decode result of `recognizer`.
    pub fn new(recognizer: Arc<dyn FormatRecognizer>, decoded: Decoded) -> Self {
        Self {
            recognizer,
            state: decoded.state,
            media_type: decoded.media_type,
            extension: decoded.extension,
        }
    }

    /// Format name.
    pub fn name(&self) -> &'static str {
        self.recognizer.name()
    }

    /// The recognizer that matched.
    pub fn recognizer(&self) -> &Arc<dyn FormatRecognizer> {
        &self.recognizer
    }

    /// Media type of the value, falling back to the recognizer's.
    pub fn media_type(&self) -> Option<&str> {
        self.media_type
            .as_deref()
            .or_else(|| self.recognizer.media_type())
    }

    /// Extension of the value, falling back to the recognizer's.
    pub fn extension(&self) -> Option<&str> {
        self.extension
            .as_deref()
            .or_else(|| self.recognizer.extension())
    }

    /// The decoded value, decoding it now if it was deferred.
    pub fn value_mut(&mut self) -> Result<&mut Entity> {
        if matches!(self.state, ValueState::Pending(_)) {
            if let ValueState::Pending(decode) =
                std::mem::replace(&mut self.state, ValueState::Released)
            {
                self.state = ValueState::Ready(Box::new(decode()?));
            }
        }
        match &mut self.state {
            ValueState::Ready(entity) => Ok(&mut **entity),
            _ => Err(AnalysisError::Disposed {
                format: self.recognizer.name(),
            }),
        }
    }

    /// Whether the value has been decoded and not yet released.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, ValueState::Ready(_))
    }

    /// Whether the value has been released.
    pub fn is_released(&self) -> bool {
        matches!(self.state, ValueState::Released)
    }

    /// Release the value now. Later calls do nothing.
    pub fn dispose(&mut self) {
        if !self.is_released() {
            tracing::trace!(format = self.recognizer.name(), "releasing decoded value");
            self.state = ValueState::Released;
        }
    }
}

impl Drop for FormatObject {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for FormatObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            ValueState::Pending(_) => "pending",
            ValueState::Ready(_) => "ready",
            ValueState::Released => "released",
        };
        f.debug_struct("FormatObject")
            .field("format", &self.name())
            .field("media_type", &self.media_type())
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CustomEntity, Entity};
    use crate::format::{EncodingDetector, MatchContext, MatchOutcome};
    use crate::input::Input;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Stub;

    impl FormatRecognizer for Stub {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn header_length(&self) -> usize {
            0
        }
        fn media_type(&self) -> Option<&'static str> {
            Some("application/x-stub")
        }
        fn check_header(&self, _: &[u8], _: bool, _: &EncodingDetector) -> bool {
            true
        }
        fn decode(&self, _: &Input, _: &MatchContext) -> Result<MatchOutcome> {
            Ok(MatchOutcome::NoMatch)
        }
    }

    static RELEASED: AtomicUsize = AtomicUsize::new(0);

    struct Handle;

    impl Drop for Handle {
        fn drop(&mut self) {
            RELEASED.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CustomEntity for Handle {
        fn kind(&self) -> &'static str {
            "handle"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_deferred_decodes_once_and_releases_once() {
        let decodes = Arc::new(AtomicUsize::new(0));
        let counter = decodes.clone();
        let decoded = Decoded::deferred(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Entity::Custom(Box::new(Handle)))
        })
        .with_media_type("application/x-handle");

        let before = RELEASED.load(Ordering::SeqCst);
        let mut object = FormatObject::new(Arc::new(Stub), decoded);
        assert!(!object.is_ready());
        object.value_mut().unwrap();
        object.value_mut().unwrap();
        assert_eq!(decodes.load(Ordering::SeqCst), 1);
        assert_eq!(object.media_type(), Some("application/x-handle"));

        object.dispose();
        object.dispose();
        assert!(matches!(object.value_mut(), Err(AnalysisError::Disposed { .. })));
        drop(object);
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 1);
    }

    struct Plain;

    impl CustomEntity for Plain {
        fn kind(&self) -> &'static str {
            "plain"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_media_type_falls_back_to_recognizer() {
        let object = FormatObject::new(
            Arc::new(Stub),
            Decoded::ready(Entity::Custom(Box::new(Plain))),
        );
        assert_eq!(object.media_type(), Some("application/x-stub"));
        assert_eq!(object.extension(), None);
    }
}
