//! First-match format resolution.

use super::{FormatObject, FormatRegistry, MatchContext, MatchOutcome};
use crate::error::Result;
use crate::input::Input;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Resolves content to the first recognizer that decodes it.
#[derive(Clone)]
pub struct Matcher {
    registry: Arc<FormatRegistry>,
    header_length: usize,
}

impl Matcher {
    /// Matcher over a fixed registry.
    pub fn new(registry: Arc<FormatRegistry>) -> Self {
        let header_length = registry.max_header_length();
        Self {
            registry,
            header_length,
        }
    }

    /// The registry being matched against.
    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Bytes buffered from each input before candidates are tried.
    pub fn header_length(&self) -> usize {
        self.header_length
    }

    /// Find the first recognizer whose header check and decode both succeed.
    ///
    /// `Ok(None)` means no format matched; the content is opaque data.
    /// Non-fatal decode errors are logged and treated as no match.
    pub fn try_match(&self, input: &Input, cx: &MatchContext) -> Result<Option<FormatObject>> {
        cx.checkpoint()?;
        let header = input.header(self.header_length)?;
        let detector = cx.detector();
        let is_binary = detector.is_binary(&header);

        for recognizer in self.registry.iter() {
            if recognizer.header_length() > header.len() {
                continue;
            }
            if let Some(signature) = recognizer.signature() {
                if !signature.matches(&header) {
                    continue;
                }
            }
            if !recognizer.check_header(&header, is_binary, detector) {
                continue;
            }

            cx.checkpoint()?;
            match recognizer.decode(input, cx) {
                Ok(MatchOutcome::Matched(decoded)) => {
                    debug!(format = recognizer.name(), "format matched");
                    return Ok(Some(FormatObject::new(recognizer.clone(), decoded)));
                }
                Ok(MatchOutcome::NoMatch) => {
                    trace!(format = recognizer.name(), "decode disproved header");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        format = recognizer.name(),
                        error = %e,
                        "recognizer failed, treating as no match"
                    );
                }
            }
        }

        trace!(len = input.len(), "no format matched");
        Ok(None)
    }

    /// Match and hand the object to `f`; the value is released when `f`
    /// returns, on success or failure.
    pub fn match_with<R>(
        &self,
        input: &Input,
        cx: &MatchContext,
        f: impl FnOnce(&mut FormatObject) -> Result<R>,
    ) -> Result<Option<R>> {
        match self.try_match(input, cx)? {
            Some(mut object) => {
                let result = f(&mut object);
                object.dispose();
                result.map(Some)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CustomEntity, Entity};
    use crate::error::AnalysisError;
    use crate::format::{matched, Decoded, EncodingDetector, FormatRecognizer, Signature};
    use crate::types::AnalyzerOptions;
    use std::any::Any;

    struct Tag(&'static str);

    impl CustomEntity for Tag {
        fn kind(&self) -> &'static str {
            self.0
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    enum Behaviour {
        Match,
        NoMatch,
        Fail,
        Cancel,
    }

    struct Fake {
        name: &'static str,
        header: usize,
        signature: Option<Signature>,
        behaviour: Behaviour,
    }

    impl Fake {
        fn new(name: &'static str, signature: &'static [u8], behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name,
                header: signature.len(),
                signature: Some(Signature::prefix(signature)),
                behaviour,
            })
        }
    }

    impl FormatRecognizer for Fake {
        fn name(&self) -> &'static str {
            self.name
        }
        fn header_length(&self) -> usize {
            self.header
        }
        fn signature(&self) -> Option<Signature> {
            self.signature
        }
        fn check_header(&self, _: &[u8], _: bool, _: &EncodingDetector) -> bool {
            true
        }
        fn decode(&self, _: &Input, _: &MatchContext) -> Result<MatchOutcome> {
            match self.behaviour {
                Behaviour::Match => matched(Entity::Custom(Box::new(Tag(self.name)))),
                Behaviour::NoMatch => Ok(MatchOutcome::NoMatch),
                Behaviour::Fail => Err(AnalysisError::malformed("fake", "boom")),
                Behaviour::Cancel => Err(AnalysisError::Cancelled),
            }
        }
    }

    fn matcher(recognizers: Vec<Arc<Fake>>) -> Matcher {
        let mut registry = FormatRegistry::new();
        for r in recognizers {
            registry.register(r);
        }
        Matcher::new(Arc::new(registry))
    }

    fn cx() -> MatchContext {
        MatchContext::new(Arc::new(AnalyzerOptions::new()))
    }

    fn matched_name(matcher: &Matcher, data: &[u8]) -> Option<&'static str> {
        matcher
            .try_match(&Input::from_slice(data), &cx())
            .unwrap()
            .map(|object| object.name())
    }

    #[test]
    fn test_registration_order_wins() {
        let a = Fake::new("a", b"AB", Behaviour::Match);
        let b = Fake::new("b", b"A", Behaviour::Match);
        assert_eq!(matched_name(&matcher(vec![a.clone(), b.clone()]), b"ABCD"), Some("a"));
        assert_eq!(matched_name(&matcher(vec![b, a]), b"ABCD"), Some("b"));
    }

    #[test]
    fn test_match_is_deterministic() {
        let m = matcher(vec![
            Fake::new("x", b"X", Behaviour::Match),
            Fake::new("a", b"A", Behaviour::Match),
        ]);
        let first = matched_name(&m, b"A123");
        for _ in 0..10 {
            assert_eq!(matched_name(&m, b"A123"), first);
        }
    }

    #[test]
    fn test_no_match_and_failure_fall_through() {
        let m = matcher(vec![
            Fake::new("refuses", b"MZ", Behaviour::NoMatch),
            Fake::new("broken", b"MZ", Behaviour::Fail),
            Fake::new("mz", b"MZ", Behaviour::Match),
        ]);
        assert_eq!(matched_name(&m, b"MZ\x90\x00"), Some("mz"));
    }

    #[test]
    fn test_nothing_matches() {
        let m = matcher(vec![Fake::new("a", b"AB", Behaviour::Match)]);
        assert_eq!(matched_name(&m, b"\x00\x01\x02\x03"), None);
    }

    #[test]
    fn test_short_input_skips_long_headers() {
        let m = matcher(vec![
            Fake::new("long", b"ABCDEFGH", Behaviour::Match),
            Fake::new("short", b"AB", Behaviour::Match),
        ]);
        assert_eq!(m.header_length(), 8);
        assert_eq!(matched_name(&m, b"ABC"), Some("short"));
    }

    #[test]
    fn test_fatal_error_propagates() {
        let m = matcher(vec![Fake::new("cancel", b"C", Behaviour::Cancel)]);
        let err = m.try_match(&Input::from_slice(b"C"), &cx()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_match_with_releases_value() {
        let m = matcher(vec![Fake::new("a", b"A", Behaviour::Match)]);
        let mut seen = None;
        let out = m
            .match_with(&Input::from_slice(b"A"), &cx(), |object| {
                seen = Some(object.value_mut()?.tag());
                Ok(object.name())
            })
            .unwrap();
        assert_eq!(out, Some("a"));
        assert!(seen.is_some());
    }

    #[test]
    fn test_deferred_decode_survives_matching() {
        struct Lazy;
        impl FormatRecognizer for Lazy {
            fn name(&self) -> &'static str {
                "lazy"
            }
            fn header_length(&self) -> usize {
                1
            }
            fn decode(&self, input: &Input, _: &MatchContext) -> Result<MatchOutcome> {
                let input = input.clone();
                Ok(MatchOutcome::Matched(Decoded::deferred(move || {
                    let _ = input.to_vec()?;
                    Ok(Entity::Custom(Box::new(Tag("lazy"))))
                })))
            }
        }
        let mut registry = FormatRegistry::new();
        registry.register(Arc::new(Lazy));
        let m = Matcher::new(Arc::new(registry));
        let mut object = m.try_match(&Input::from_slice(b"z"), &cx()).unwrap().unwrap();
        assert!(!object.is_ready());
        assert!(object.value_mut().is_ok());
    }
}
