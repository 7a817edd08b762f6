//! The conversation state machine.
//!
//! [`react`] is a pure function from the current [`Step`] and one [`Input`]
//! to a [`Reaction`]. It never performs I/O; the dispatcher in
//! [`crate::bot`] carries out whatever the reaction asks for and stores the
//! resulting step.
//!
//! ```text
//! Start            --select(item)-->      CourseDetail
//! CourseDetail     --buy-->               EnteringName
//! EnteringName     --valid text-->        EnteringEmail
//! EnteringEmail    --valid text-->        EnteringPosition
//! EnteringPosition --valid text-->        persist, then SelectingBank or SavePending
//! SavePending      --retry-->             persist the same record again
//! SelectingBank    --select channel-->    Completed
//! SelectingBank    --select(item)-->      CourseDetail
//! Completed        --back to channels-->  SelectingBank
//! any              --back to courses-->   Start (session reset)
//! ```

use chrono::{DateTime, Utc};

use crate::catalog::{Catalog, CourseId, PaymentChannel};
use crate::ledger::SubmissionRecord;
use crate::session::Step;
use crate::validation::{self, ValidationError};

const COURSE_PREFIX: &str = "course_";
const BANK_PREFIX: &str = "select_bank_";

/// Button-press actions, addressed by their callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SelectCourse(CourseId),
    Buy,
    BackToCourses,
    SelectChannel(PaymentChannel),
    BackToChannels,
    RetrySave,
}

impl Action {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "buy_course" => Some(Action::Buy),
            "back_to_courses" => Some(Action::BackToCourses),
            "back_to_banks" => Some(Action::BackToChannels),
            "retry_save_data" => Some(Action::RetrySave),
            _ => {
                if let Some(id) = data.strip_prefix(COURSE_PREFIX) {
                    id.parse().ok().map(|id| Action::SelectCourse(CourseId(id)))
                } else if let Some(code) = data.strip_prefix(BANK_PREFIX) {
                    PaymentChannel::from_code(code).map(Action::SelectChannel)
                } else {
                    None
                }
            }
        }
    }

    pub fn callback_data(self) -> String {
        match self {
            Action::SelectCourse(id) => format!("{COURSE_PREFIX}{id}"),
            Action::Buy => "buy_course".to_string(),
            Action::BackToCourses => "back_to_courses".to_string(),
            Action::SelectChannel(channel) => format!("{BANK_PREFIX}{}", channel.code()),
            Action::BackToChannels => "back_to_banks".to_string(),
            Action::RetrySave => "retry_save_data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input<'a> {
    Start,
    Help,
    Action(Action),
    /// A button whose data no longer maps to any action.
    Unrecognized,
    Text(&'a str),
}

/// Read-only facts a transition may depend on.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub catalog: &'a Catalog,
    pub now: DateTime<Utc>,
    /// Handle of the user, recorded with the submission.
    pub submitter: &'a str,
}

/// Short user-facing explanation for an input that did not advance the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    CourseNotFound,
    OutOfFlow,
    NotApplicable,
    IncompleteSession,
    ChannelUnavailable,
}

impl Notice {
    pub fn key(self) -> &'static str {
        match self {
            Notice::CourseNotFound => "errors.courseNotFound",
            Notice::OutOfFlow => "errors.useStart",
            Notice::NotApplicable => "errors.notApplicable",
            Notice::IncompleteSession => "errors.incompleteSession",
            Notice::ChannelUnavailable => "errors.channelUnavailable",
        }
    }
}

/// What the dispatcher has to do in response to an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Move to the given step and render it. Entering [`Step::Start`] resets the session.
    Enter(Step),
    /// Keep the step and ask the same question again, explaining the problem.
    Reject(ValidationError),
    /// Write the record to the ledger, then continue with [`settle`].
    Persist(SubmissionRecord),
    /// Keep the step and show the notice.
    Stay(Notice),
    /// Reset to the catalog root and show the notice.
    Recover(Notice),
    Help,
}

pub fn react(step: &Step, input: Input<'_>, ctx: &Context<'_>) -> Reaction {
    match input {
        Input::Start | Input::Action(Action::BackToCourses) => Reaction::Enter(Step::Start),
        Input::Help => Reaction::Help,
        Input::Unrecognized => Reaction::Stay(Notice::NotApplicable),
        Input::Action(Action::SelectCourse(course_id)) => select_course(course_id, ctx),
        Input::Action(action) => on_action(step, action, ctx),
        Input::Text(text) => on_text(step, text, ctx),
    }
}

/// Step reached after a persistence attempt for `record`.
pub fn settle(record: SubmissionRecord, saved: bool) -> Step {
    if saved {
        Step::SelectingBank {
            course_id: record.item_id,
            applicant: record.applicant(),
        }
    } else {
        Step::SavePending { record }
    }
}

fn select_course(course_id: CourseId, ctx: &Context<'_>) -> Reaction {
    match ctx.catalog.get(course_id) {
        Some(_) => Reaction::Enter(Step::CourseDetail { course_id }),
        None => Reaction::Recover(Notice::CourseNotFound),
    }
}

fn on_action(step: &Step, action: Action, ctx: &Context<'_>) -> Reaction {
    match (step, action) {
        (Step::CourseDetail { course_id }, Action::Buy) => match ctx.catalog.get(*course_id) {
            Some(_) => Reaction::Enter(Step::EnteringName {
                course_id: *course_id,
            }),
            None => Reaction::Recover(Notice::CourseNotFound),
        },

        (
            Step::SelectingBank {
                course_id,
                applicant,
            },
            Action::SelectChannel(channel),
        ) => {
            let Some(course) = ctx.catalog.get(*course_id) else {
                return Reaction::Recover(Notice::CourseNotFound);
            };
            if course.payment_details(channel, ctx.now).is_none() {
                return Reaction::Stay(Notice::ChannelUnavailable);
            }
            Reaction::Enter(Step::Completed {
                course_id: *course_id,
                applicant: applicant.clone(),
                channel,
            })
        }

        (
            Step::Completed {
                course_id,
                applicant,
                ..
            },
            Action::BackToChannels,
        ) => Reaction::Enter(Step::SelectingBank {
            course_id: *course_id,
            applicant: applicant.clone(),
        }),

        (Step::SavePending { record }, Action::RetrySave) => Reaction::Persist(record.clone()),
        // Already saved; replaying would append a duplicate row.
        (Step::SelectingBank { .. } | Step::Completed { .. }, Action::RetrySave) => {
            Reaction::Stay(Notice::NotApplicable)
        }
        (_, Action::RetrySave) => Reaction::Recover(Notice::IncompleteSession),

        _ => Reaction::Stay(Notice::NotApplicable),
    }
}

fn on_text(step: &Step, text: &str, ctx: &Context<'_>) -> Reaction {
    match step {
        Step::EnteringName { course_id } => match validation::validate_name(text) {
            Ok(name) => Reaction::Enter(Step::EnteringEmail {
                course_id: *course_id,
                name,
            }),
            Err(err) => Reaction::Reject(err),
        },

        Step::EnteringEmail { course_id, name } => match validation::validate_email(text) {
            Ok(email) => Reaction::Enter(Step::EnteringPosition {
                course_id: *course_id,
                name: name.clone(),
                email,
            }),
            Err(err) => Reaction::Reject(err),
        },

        Step::EnteringPosition {
            course_id,
            name,
            email,
        } => {
            let position = match validation::validate_position(text) {
                Ok(position) => position,
                Err(err) => return Reaction::Reject(err),
            };
            let Some(course) = ctx.catalog.get(*course_id) else {
                return Reaction::Recover(Notice::CourseNotFound);
            };
            Reaction::Persist(SubmissionRecord {
                submitted_at: ctx.now,
                submitter: ctx.submitter.to_string(),
                email: email.clone(),
                name: name.clone(),
                position,
                item_id: course.id,
                item_name: course.name.clone(),
            })
        }

        _ => Reaction::Stay(Notice::OutOfFlow),
    }
}
