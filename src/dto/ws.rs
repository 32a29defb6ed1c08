use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::dto::validation::{validate_identifier, validate_text};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
/// Envelope of every WebSocket text frame, in both directions.
pub struct EventFrame {
    /// Event name (e.g. `host`, `getRoomState`, `error`).
    pub event: String,
    /// Positional arguments of the event.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub args: Vec<Value>,
}

impl EventFrame {
    /// Frame carrying the given positional arguments.
    pub fn new(event: &str, args: Vec<Value>) -> Self {
        Self {
            event: event.to_string(),
            args,
        }
    }

    /// Frame carrying one serialized payload.
    pub fn single<T>(event: &str, payload: &T) -> serde_json::Result<Self>
    where
        T: ?Sized + Serialize,
    {
        Ok(Self::new(event, vec![serde_json::to_value(payload)?]))
    }

    /// Parse a text frame into its envelope.
    pub fn from_json_str(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Reasons an inbound frame cannot be turned into a command.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not a JSON event envelope.
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    /// No command is registered under this event name.
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    /// A required positional argument is absent or empty.
    #[error("`{event}` is missing argument `{name}`")]
    MissingArgument {
        /// Event being decoded.
        event: String,
        /// Protocol name of the argument.
        name: &'static str,
    },
    /// A positional argument has the wrong JSON type or shape.
    #[error("`{event}` argument `{name}` must be a {expected}")]
    InvalidArgument {
        /// Event being decoded.
        event: String,
        /// Protocol name of the argument.
        name: &'static str,
        /// Human readable description of the accepted values.
        expected: &'static str,
    },
    /// Field-level validation rejected the arguments.
    #[error("invalid arguments: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Clone, PartialEq, Eq, Validate)]
/// Arguments of the `host` event.
pub struct HostRequest {
    /// Username claiming the host role.
    #[validate(custom(function = "validate_identifier"))]
    pub username: String,
    /// Room to host; created on first use.
    #[validate(custom(function = "validate_identifier"))]
    pub room_id: String,
    /// Group the presentation is restricted to, when group-scoped.
    #[validate(custom(function = "validate_identifier"))]
    pub group_id: Option<String>,
    /// Access token; required for group-scoped rooms.
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Validate)]
/// Arguments of the `join` event.
pub struct JoinRequest {
    /// Display name inside the room.
    #[validate(custom(function = "validate_identifier"))]
    pub username: String,
    /// Room to enter.
    #[validate(custom(function = "validate_identifier"))]
    pub room_id: String,
    /// Access token; only checked by group-scoped rooms.
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Validate)]
/// Arguments of the `submitAnswer` event.
pub struct SubmitAnswerRequest {
    /// Question being answered.
    #[validate(custom(function = "validate_identifier"))]
    pub question_id: String,
    /// Chosen answer option.
    #[validate(custom(function = "validate_identifier"))]
    pub answer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Validate)]
/// Free text carried by `chat` and `postQuestion`.
pub struct TextRequest {
    /// Trimmed, non-empty text.
    #[validate(custom(function = "validate_text"))]
    pub text: String,
}

/// Direction of a step change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    /// `next`: one step forward.
    Next,
    /// `prev`: one step back.
    Prev,
}

/// Typed command decoded from an inbound room-socket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `host`: claim the host role of a room.
    Host(HostRequest),
    /// `join`: enter a room as a participant.
    Join(JoinRequest),
    /// `next` / `prev`.
    Step(StepDirection),
    /// Current step of the caller's room.
    GetRoomState,
    /// Rooms with at least one active participant.
    GetRoomActive,
    /// Active participants of the caller's room.
    GetActiveParticipants,
    /// Record an answer to a question.
    SubmitAnswer(SubmitAnswerRequest),
    /// Re-broadcast the statistics of a question.
    ShowStatistic {
        /// Question whose statistics are shown.
        question_id: String,
    },
    /// Post a chat line.
    Chat(TextRequest),
    /// Chat transcript of the caller's room.
    GetChatHistory,
    /// Ask an audience question.
    PostQuestion(TextRequest),
    /// Audience questions of the caller's room.
    ListUserQuestion,
    /// Add a vote to an audience question.
    UpvoteQuestion {
        /// Question receiving the vote.
        question_id: Uuid,
    },
    /// Flip the answered marker of an audience question.
    ToggleUserQuestionAnswered {
        /// Question whose marker flips.
        question_id: Uuid,
    },
    /// Tear a room down (host only).
    CancelPresentation {
        /// Room to cancel.
        room_id: String,
    },
    /// Room presented to a group.
    GetSlidePresentation {
        /// Group being asked about.
        group_id: String,
    },
    /// Client-side close of the socket.
    ManualDisconnect,
}

impl ClientCommand {
    /// Decode and validate a frame's positional arguments.
    pub fn parse(frame: EventFrame) -> Result<Self, ProtocolError> {
        let EventFrame { event, args } = frame;
        let mut args = PositionalArgs::new(&event, args);

        let command = match event.as_str() {
            "host" => {
                let username = args.required_string("username")?;
                let room_id = args.required_string("roomID")?;
                let group_scoped = args.flag("isGroupScoped")?;
                let group_id = args.optional_string("groupID")?;
                let token = args.optional_string("authToken")?;
                // Open rooms carry neither a group nor a token.
                let (group_id, token) = match (group_scoped, group_id) {
                    (true, None) => return Err(args.missing("groupID")),
                    (true, group_id) => (group_id, token),
                    (false, _) => (None, None),
                };
                let request = HostRequest {
                    username,
                    room_id,
                    group_id,
                    token,
                };
                request.validate()?;
                Self::Host(request)
            }
            "join" => {
                let request = JoinRequest {
                    username: args.required_string("username")?,
                    room_id: args.required_string("roomID")?,
                    token: args.optional_string("authToken")?,
                };
                request.validate()?;
                Self::Join(request)
            }
            "next" => Self::Step(StepDirection::Next),
            "prev" => Self::Step(StepDirection::Prev),
            "getRoomState" => Self::GetRoomState,
            "getRoomActive" => Self::GetRoomActive,
            "getActiveParticipants" => Self::GetActiveParticipants,
            "submitAnswer" => {
                let request = SubmitAnswerRequest {
                    question_id: args.required_string("questionID")?,
                    answer_id: args.required_string("answerID")?,
                };
                request.validate()?;
                Self::SubmitAnswer(request)
            }
            "showStatistic" => Self::ShowStatistic {
                question_id: args.identifier("questionID")?,
            },
            "chat" => Self::Chat(args.text("text")?),
            "getChatHistory" => Self::GetChatHistory,
            "postQuestion" => Self::PostQuestion(args.text("text")?),
            "listUserQuestion" => Self::ListUserQuestion,
            "upvoteQuestion" => Self::UpvoteQuestion {
                question_id: args.uuid("questionID")?,
            },
            "toggleUserQuestionAnswered" => Self::ToggleUserQuestionAnswered {
                question_id: args.uuid("questionID")?,
            },
            "cancelPresentation" => Self::CancelPresentation {
                room_id: args.identifier("roomID")?,
            },
            "getSlidePresentation" => Self::GetSlidePresentation {
                group_id: args.identifier("groupID")?,
            },
            "manualDisconnect" => Self::ManualDisconnect,
            _ => return Err(ProtocolError::UnknownEvent(event)),
        };

        Ok(command)
    }

    /// Whether the command may run before the connection joined a room.
    pub fn allowed_without_room(&self) -> bool {
        matches!(
            self,
            Self::Host(_)
                | Self::Join(_)
                | Self::GetRoomActive
                | Self::GetSlidePresentation { .. }
                | Self::ManualDisconnect
        )
    }
}

/// First frame expected on the group notification socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationJoin {
    /// Access token identifying the listening user.
    pub token: String,
}

impl NotificationJoin {
    /// Decode a `join` frame carrying the access token.
    pub fn parse(frame: EventFrame) -> Result<Self, ProtocolError> {
        let EventFrame { event, args } = frame;
        if event != "join" && event != "notification:join" {
            return Err(ProtocolError::UnknownEvent(event));
        }
        let mut args = PositionalArgs::new(&event, args);
        Ok(Self {
            token: args.required_string("authToken")?,
        })
    }
}

/// Cursor over the positional arguments of one frame.
struct PositionalArgs<'a> {
    event: &'a str,
    values: std::vec::IntoIter<Value>,
}

impl<'a> PositionalArgs<'a> {
    fn new(event: &'a str, values: Vec<Value>) -> Self {
        Self {
            event,
            values: values.into_iter(),
        }
    }

    fn missing(&self, name: &'static str) -> ProtocolError {
        ProtocolError::MissingArgument {
            event: self.event.to_string(),
            name,
        }
    }

    fn invalid(&self, name: &'static str, expected: &'static str) -> ProtocolError {
        ProtocolError::InvalidArgument {
            event: self.event.to_string(),
            name,
            expected,
        }
    }

    /// Strings are taken verbatim; numbers are accepted for numeric identifiers.
    fn optional_string(&mut self, name: &'static str) -> Result<Option<String>, ProtocolError> {
        match self.values.next() {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) if value.is_empty() => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(Value::Number(value)) => Ok(Some(value.to_string())),
            Some(_) => Err(self.invalid(name, "string")),
        }
    }

    fn required_string(&mut self, name: &'static str) -> Result<String, ProtocolError> {
        self.optional_string(name)?
            .ok_or_else(|| self.missing(name))
    }

    fn flag(&mut self, name: &'static str) -> Result<bool, ProtocolError> {
        match self.values.next() {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(value)) => Ok(value),
            Some(_) => Err(self.invalid(name, "boolean")),
        }
    }

    fn identifier(&mut self, name: &'static str) -> Result<String, ProtocolError> {
        let value = self.required_string(name)?;
        validate_identifier(&value).map_err(|_| self.invalid(name, "valid identifier"))?;
        Ok(value)
    }

    fn text(&mut self, name: &'static str) -> Result<TextRequest, ProtocolError> {
        let request = TextRequest {
            text: self.required_string(name)?,
        };
        request.validate()?;
        Ok(request)
    }

    fn uuid(&mut self, name: &'static str) -> Result<Uuid, ProtocolError> {
        let value = self.required_string(name)?;
        Uuid::parse_str(&value).map_err(|_| self.invalid(name, "UUID"))
    }
}
