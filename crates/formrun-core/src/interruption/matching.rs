//! Handler lookup and option ranking.

use regex::RegexBuilder;

use super::Event;
use crate::condition::normalize;
use crate::workflow::{Handler, HandlerTrigger, MatchMode};

/// Whether a trigger matches an event.
///
/// Templates and controls are compared case- and whitespace-insensitively.
/// An invalid regex never matches.
pub fn trigger_matches(trigger: &HandlerTrigger, event: &Event) -> bool {
    if trigger.kind != event.kind {
        return false;
    }

    let template = normalize(&event.template);
    let wanted = normalize(&trigger.text_template);

    let text_matches = match trigger.match_mode {
        MatchMode::Contains => template.contains(&wanted),
        MatchMode::Exact => template == wanted,
        MatchMode::Regex => match RegexBuilder::new(&trigger.text_template)
            .case_insensitive(true)
            .build()
        {
            Ok(re) => re.is_match(&event.template) || re.is_match(&event.text),
            Err(e) => {
                tracing::warn!(
                    pattern = %trigger.text_template,
                    error = %e,
                    "Invalid handler regex"
                );
                false
            }
        },
    };

    text_matches
        && trigger
            .required_controls
            .iter()
            .all(|required| event.has_control(required))
}

/// Highest-priority enabled handler matching the event.
///
/// Ties go to the handler declared first.
pub fn find_handler<'a>(handlers: &'a [Handler], event: &Event) -> Option<&'a Handler> {
    let mut best: Option<&Handler> = None;
    for handler in handlers
        .iter()
        .filter(|h| h.enabled && trigger_matches(&h.trigger, event))
    {
        match best {
            Some(current) if current.priority >= handler.priority => {}
            _ => best = Some(handler),
        }
    }
    best
}

fn option_rank(option: &str) -> u8 {
    let option = normalize(option);
    if option.contains("remove") || option.contains("delete") {
        0
    } else if option.contains("cancel") {
        1
    } else if option.contains("close") {
        2
    } else if option == "no" {
        3
    } else {
        4
    }
}

/// Order candidate controls for a decision request.
///
/// Undo-style actions (remove, delete) come first, then cancel, close and
/// "no"; everything else keeps its original order at the end.
pub fn rank_options(controls: &[String]) -> Vec<String> {
    let mut ranked = controls.to_vec();
    ranked.sort_by_key(|option| option_rank(option));
    ranked
}
