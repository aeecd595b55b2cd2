//! Best-effort inference of where a lead came from.
//!
//! Each step runs only when every earlier step yielded nothing:
//! creation-time notes, creation-time events, the `INPUT` capture field,
//! tag keywords and finally keywords in the lead name.

use regex::Regex;
use std::sync::LazyLock;

use crate::model::{Event, EventKind, Note, NoteKind};

#[allow(clippy::expect_used)]
static CAPTURE_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?utm|&utm|&amp;utm|\.com").expect("capture pattern compiles"));

const OTHER_FORM: &str = "Capture form <Other>";
const FORM_TAG_KEYWORDS: [&str; 4] = ["kontact-forma", "tilda", "contactform", "invite"];

/// Inputs of the inference chain.
#[derive(Debug, Clone, Copy)]
pub struct SourceHints<'a> {
    /// Lead title.
    pub name: &'a str,
    /// Tags joined with `, `.
    pub tags: &'a str,
    /// `INPUT` field value.
    pub input_field: &'a str,
    /// Notes inside the creation window.
    pub creation_notes: &'a [&'a Note],
    /// Events inside the creation window.
    pub creation_events: &'a [&'a Event],
}

/// Infers the creation source. Returns an empty string when nothing matches.
#[must_use]
pub fn infer_creation_source(hints: &SourceHints<'_>) -> String {
    from_notes(hints.creation_notes)
        .or_else(|| from_events(hints.creation_events))
        .or_else(|| from_input(hints.input_field))
        .or_else(|| from_tags(hints.tags))
        .or_else(|| from_name(hints.name))
        .unwrap_or_default()
}

fn labelled(label: &str, source: Option<&str>) -> String {
    match source.filter(|s| !s.is_empty()) {
        Some(source) => format!("{label} {source}"),
        None => label.to_string(),
    }
}

fn from_notes(notes: &[&Note]) -> Option<String> {
    notes.iter().find_map(|note| {
        let params = &note.params;
        match note.note_type {
            NoteKind::CallIn => Some(labelled("Incoming call", params.source.as_deref())),
            NoteKind::CallOut => Some(labelled("Outgoing call", params.source.as_deref())),
            NoteKind::Email => Some(format!(
                "Capture form {}",
                params.subject.as_deref().unwrap_or_default()
            )),
            _ => {
                let text = params.text.as_deref().filter(|t| !t.is_empty())?;
                if CAPTURE_TEXT.is_match(text) {
                    Some(format!("Capture form {text}"))
                } else if text == "Not available." || text.contains("lpsecret") {
                    Some(OTHER_FORM.to_string())
                } else {
                    None
                }
            }
        }
    })
}

fn from_events(events: &[&Event]) -> Option<String> {
    events.iter().find_map(|event| match event.kind {
        EventKind::LeadAdded if event.created_by > 0 => Some("Manually created".to_string()),
        EventKind::IncomingChat => event.message_origin().map(|origin| {
            match origin {
                "e-chat.tech" => "Incoming chat Viber",
                "com.amocrm.amocrmwa" => "Incoming chat WhatsApp",
                _ => "Incoming chat",
            }
            .to_string()
        }),
        EventKind::IncomingCall => Some("Incoming call".to_string()),
        _ => None,
    })
}

fn first_token(after: &str) -> &str {
    after.split(' ').next().unwrap_or_default()
}

fn from_input(input: &str) -> Option<String> {
    if let Some((_, rest)) = input.split_once("https://") {
        Some(format!("Capture form {}", first_token(rest)))
    } else if let Some((_, rest)) = input.split_once("http://") {
        // Plain-http forms carry no prefix.
        Some(first_token(rest).to_string())
    } else if input.contains('@') {
        Some(OTHER_FORM.to_string())
    } else {
        None
    }
}

fn from_tags(tags: &str) -> Option<String> {
    let tags = tags.to_lowercase();
    let label = if tags.contains("itgrix") {
        "Incoming call Itgrix"
    } else if tags.contains("jivo") {
        "Incoming chat Jivo"
    } else if tags.contains("sipuni") {
        "Incoming call Sipuni"
    } else if tags.contains("phone") {
        "Incoming call Phone"
    } else if FORM_TAG_KEYWORDS.iter().any(|k| tags.contains(k)) {
        return Some(format!("Capture form {tags}"));
    } else {
        return None;
    };
    Some(label.to_string())
}

fn from_name(name: &str) -> Option<String> {
    let name = name.to_lowercase();
    if name.contains("исходящий") {
        Some("Outgoing call".to_string())
    } else if name.contains("входящий") {
        Some("Incoming call".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChatMessage, EventValue, NoteParams};
    use pretty_assertions::assert_eq;

    fn note(kind: NoteKind, params: NoteParams) -> Note {
        Note {
            note_type: kind,
            created_at: 0,
            created_by: None,
            params,
        }
    }

    fn event(kind: EventKind, created_by: i64, origin: Option<&str>) -> Event {
        Event {
            kind,
            created_at: 0,
            created_by,
            value_before: Vec::new(),
            value_after: origin
                .map(|o| {
                    vec![EventValue {
                        lead_status: None,
                        message: Some(ChatMessage {
                            origin: Some(o.to_string()),
                        }),
                    }]
                })
                .unwrap_or_default(),
        }
    }

    fn infer(notes: &[&Note], events: &[&Event], input: &str, tags: &str, name: &str) -> String {
        infer_creation_source(&SourceHints {
            name,
            tags,
            input_field: input,
            creation_notes: notes,
            creation_events: events,
        })
    }

    #[test]
    fn test_call_note_wins() {
        let call = note(
            NoteKind::CallIn,
            NoteParams {
                source: Some("itgrix_amo".into()),
                ..NoteParams::default()
            },
        );
        let chat = event(EventKind::IncomingChat, 0, Some("e-chat.tech"));
        assert_eq!(infer(&[&call], &[&chat], "", "jivo", ""), "Incoming call itgrix_amo");

        let bare = note(NoteKind::CallOut, NoteParams::default());
        assert_eq!(infer(&[&bare], &[], "", "", ""), "Outgoing call");
    }

    #[test]
    fn test_note_text_patterns() {
        let utm = note(
            NoteKind::Common,
            NoteParams {
                text: Some("site/?utm_source=fb".into()),
                ..NoteParams::default()
            },
        );
        assert_eq!(infer(&[&utm], &[], "", "", ""), "Capture form site/?utm_source=fb");

        let sentinel = note(
            NoteKind::Common,
            NoteParams {
                text: Some("Not available.".into()),
                ..NoteParams::default()
            },
        );
        assert_eq!(infer(&[&sentinel], &[], "", "", ""), OTHER_FORM);

        let plain = note(
            NoteKind::Common,
            NoteParams {
                text: Some("called back".into()),
                ..NoteParams::default()
            },
        );
        assert_eq!(infer(&[&plain], &[], "", "", ""), "");
    }

    #[test]
    fn test_events() {
        let manual = event(EventKind::LeadAdded, 7, None);
        assert_eq!(infer(&[], &[&manual], "", "", ""), "Manually created");

        let system = event(EventKind::LeadAdded, 0, None);
        let whatsapp = event(EventKind::IncomingChat, 0, Some("com.amocrm.amocrmwa"));
        assert_eq!(infer(&[], &[&system, &whatsapp], "", "", ""), "Incoming chat WhatsApp");

        let no_message = event(EventKind::IncomingChat, 0, None);
        let call = event(EventKind::IncomingCall, 0, None);
        assert_eq!(infer(&[], &[&no_message, &call], "", "", ""), "Incoming call");
    }

    #[test]
    fn test_input_field() {
        assert_eq!(
            infer(&[], &[], "from https://clinic.com/form page", "", ""),
            "Capture form clinic.com/form"
        );
        assert_eq!(infer(&[], &[], "http://old.site/x y", "", ""), "old.site/x");
        assert_eq!(infer(&[], &[], "mail@x.org", "", ""), OTHER_FORM);
    }

    #[test]
    fn test_tags_then_name() {
        assert_eq!(infer(&[], &[], "", "Jivo, Sipuni", ""), "Incoming chat Jivo");
        assert_eq!(infer(&[], &[], "", "Tilda, Promo", ""), "Capture form tilda, promo");
        assert_eq!(infer(&[], &[], "", "", "Входящий звонок"), "Incoming call");
        assert_eq!(infer(&[], &[], "", "", "Сделка"), "");
    }
}
