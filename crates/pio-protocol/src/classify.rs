//! Response classification
//!
//! Turns the ordered raw lines of one reply into an [`Envelope`]. The first
//! line decides the kind:
//!
//! 1. no lines → ERROR `no response`
//! 2. `ERROR:` among the first two tokens → ERROR, data is the whole line
//! 3. `EXCEPTION:` among the first two tokens → EXCEPTION, data is the whole line
//! 4. a known verb as first token → that verb, data is the remaining tokens
//! 5. anything else → ERROR `unknown verb in response: <line>`
//!
//! Rules 2 and 3 are exclusive branches; when a line carries both markers,
//! [`MarkerPrecedence`] picks the winner. Lines after the first always become
//! the extension.

use crate::envelope::{Envelope, Failure};
use crate::verb::Verb;

const ERROR_MARKER: &str = "ERROR:";
const EXCEPTION_MARKER: &str = "EXCEPTION:";

/// Which marker wins when the first line carries both `ERROR:` and
/// `EXCEPTION:` in its first two tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerPrecedence {
    /// `ERROR:` is checked first
    #[default]
    ErrorFirst,
    /// `EXCEPTION:` is checked first
    ExceptionFirst,
}

/// Classify reply lines with the default [`MarkerPrecedence::ErrorFirst`]
pub fn classify<S: AsRef<str>>(lines: &[S]) -> Envelope {
    classify_with(lines, MarkerPrecedence::default())
}

/// Classify reply lines with an explicit marker precedence
pub fn classify_with<S: AsRef<str>>(lines: &[S], precedence: MarkerPrecedence) -> Envelope {
    let Some(first): Option<&str> = lines.first().map(|l| l.as_ref()) else {
        return Envelope::no_response();
    };

    let tokens: Vec<&str> = first.split_whitespace().collect();
    let head = &tokens[..tokens.len().min(2)];
    let has_error = head.contains(&ERROR_MARKER);
    let has_exception = head.contains(&EXCEPTION_MARKER);

    let envelope = match (precedence, has_error, has_exception) {
        (MarkerPrecedence::ErrorFirst, true, _)
        | (MarkerPrecedence::ExceptionFirst, true, false) => {
            Envelope::error(Failure::ProtocolError, first)
        }
        (_, _, true) => Envelope::exception(first),
        (_, false, false) => match tokens.first().and_then(|t| Verb::from_wire(t)) {
            Some(verb) => Envelope::reply(verb, tokens[1..].join(" ")),
            None => Envelope::error(
                Failure::MalformedResponse,
                format!("unknown verb in response: {}", first),
            ),
        },
    };

    let extension = if lines.len() > 1 {
        Some(
            lines[1..]
                .iter()
                .map(|l| l.as_ref())
                .collect::<Vec<&str>>()
                .join("\n"),
        )
    } else {
        None
    };

    envelope.with_extension(extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ResponseKind;
    use proptest::prelude::*;

    #[test]
    fn test_every_verb_single_line() {
        for verb in Verb::ALL {
            let env = classify(&[format!("{} some data", verb)]);
            assert_eq!(env.kind, ResponseKind::Reply(verb));
            assert_eq!(env.data, "some data");
            assert_eq!(env.extension, None);
            assert_eq!(env.failure, None);
        }
    }

    #[test]
    fn test_empty_is_no_response() {
        let env = classify::<String>(&[]);
        assert_eq!(env.kind, ResponseKind::Error);
        assert_eq!(env.data, "no response");
        assert_eq!(env.failure, Some(Failure::NoResponse));
    }

    #[test]
    fn test_error_line_is_verbatim() {
        let env = classify(&["ERROR: bad pin"]);
        assert_eq!(env.kind, ResponseKind::Error);
        assert_eq!(env.data, "ERROR: bad pin");
        assert_eq!(env.failure, Some(Failure::ProtocolError));
    }

    #[test]
    fn test_error_marker_as_second_token() {
        let env = classify(&["DIO_SET ERROR: Cannot set pin: 9"]);
        assert_eq!(env.kind, ResponseKind::Error);
        assert_eq!(env.data, "DIO_SET ERROR: Cannot set pin: 9");
    }

    #[test]
    fn test_exception_line() {
        let env = classify(&["EXCEPTION: Could not run: DIO_SET because list index"]);
        assert_eq!(env.kind, ResponseKind::Exception);
        assert_eq!(
            env.data,
            "EXCEPTION: Could not run: DIO_SET because list index"
        );
        assert_eq!(env.failure, Some(Failure::RemoteException));
    }

    #[test]
    fn test_marker_in_third_token_is_data() {
        let env = classify(&["DIO_READ 3 ERROR:"]);
        assert_eq!(env.kind, ResponseKind::Reply(Verb::DioRead));
        assert_eq!(env.data, "3 ERROR:");
    }

    #[test]
    fn test_both_markers_error_first() {
        let env = classify_with(&["ERROR: EXCEPTION: boom"], MarkerPrecedence::ErrorFirst);
        assert_eq!(env.kind, ResponseKind::Error);
        let env = classify_with(&["EXCEPTION: ERROR: boom"], MarkerPrecedence::ErrorFirst);
        assert_eq!(env.kind, ResponseKind::Error);
    }

    #[test]
    fn test_both_markers_exception_first() {
        let env = classify_with(&["ERROR: EXCEPTION: boom"], MarkerPrecedence::ExceptionFirst);
        assert_eq!(env.kind, ResponseKind::Exception);
        assert_eq!(env.data, "ERROR: EXCEPTION: boom");
        let env = classify_with(&["ERROR: boom"], MarkerPrecedence::ExceptionFirst);
        assert_eq!(env.kind, ResponseKind::Error);
    }

    #[test]
    fn test_extension_lines() {
        let env = classify(&["RELAY_LIST", "  0 true", "  1 false"]);
        assert_eq!(env.kind, ResponseKind::Reply(Verb::RelayList));
        assert_eq!(env.data, "");
        assert_eq!(env.extension.as_deref(), Some("  0 true\n  1 false"));
    }

    #[test]
    fn test_extension_kept_for_errors() {
        let env = classify(&["ERROR: Unknown Pin: 12", "see HELP"]);
        assert_eq!(env.kind, ResponseKind::Error);
        assert_eq!(env.extension.as_deref(), Some("see HELP"));
    }

    #[test]
    fn test_unknown_verb_is_malformed() {
        let env = classify(&["FROB not understood", "", "    Commands:"]);
        assert_eq!(env.kind, ResponseKind::Error);
        assert_eq!(env.failure, Some(Failure::MalformedResponse));
        assert_eq!(env.data, "unknown verb in response: FROB not understood");
        assert!(env.extension.is_some());
    }

    #[test]
    fn test_blank_first_line_is_malformed() {
        let env = classify(&["   "]);
        assert_eq!(env.failure, Some(Failure::MalformedResponse));
    }

    #[test]
    fn test_data_whitespace_is_collapsed() {
        let env = classify(&["SPI_SEND   Sent:  de  ad  "]);
        assert_eq!(env.data, "Sent: de ad");
    }

    proptest! {
        #[test]
        fn classify_never_panics(lines in proptest::collection::vec(".{0,40}", 0..5)) {
            let env = classify(&lines[..]);
            prop_assert_eq!(env.extension.is_some(), lines.len() > 1);
        }

        #[test]
        fn verb_data_is_token_join(idx in 0usize..Verb::ALL.len(), words in proptest::collection::vec("[a-z0-9]{1,6}", 0..5)) {
            let verb = Verb::ALL[idx];
            let line = format!("{} {}", verb, words.join("  "));
            let env = classify(&[line]);
            prop_assert_eq!(env.kind, ResponseKind::Reply(verb));
            prop_assert_eq!(env.data, words.join(" "));
        }
    }
}
