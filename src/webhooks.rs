use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Build, Request, Rocket, State,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::events::EventKind;
use crate::queue::EventSender;

mod extract;
use extract::Extraction;

mod signing;
use signing::SignedPayload;

const X_GITHUB_EVENT: &str = "X-GitHub-Event";

/// A request that never reached the extraction pipeline: it is missing its
/// event type discriminator or announces one we don't handle.
#[derive(Debug, Error)]
pub enum MalformedRequestError {
    #[error("request needs exactly one X-GitHub-Event header")]
    MissingEventType,
    #[error("unknown event type `{0}`")]
    UnknownEventType(String),
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for EventKind {
    type Error = MalformedRequestError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let event_types = request.headers().get(X_GITHUB_EVENT).collect::<Vec<_>>();
        if event_types.len() != 1 {
            return Outcome::Error((
                Status::BadRequest,
                MalformedRequestError::MissingEventType,
            ));
        }

        let event_type = event_types[0];
        match event_type.parse::<EventKind>() {
            Ok(kind) => Outcome::Success(kind),
            Err(_) => Outcome::Error((
                Status::BadRequest,
                MalformedRequestError::UnknownEventType(event_type.to_owned()),
            )),
        }
    }
}

/// Receives one webhook delivery.
///
/// By the time the handler body runs, the guards have already checked the
/// event type header (400 otherwise) and authenticated the raw body against
/// the configured secret (403 otherwise). What's left is classification:
/// uninteresting deliveries are acknowledged with an empty 200, extraction
/// failures are a 500 naming the offending field, and accepted events are
/// published to the dispatch queue and echoed back in their text encoding.
#[rocket::post("/", data = "<payload>")]
pub(crate) fn postreceive(
    kind: EventKind,
    payload: SignedPayload,
    config: &State<ServerConfig>,
    sender: &State<EventSender>,
) -> (Status, String) {
    match extract::extract(kind, &payload.0, config) {
        Ok(Extraction::Accepted(event)) => {
            info!(
                "accepted {} event for {}/{} on {}",
                event.kind, event.owner, event.repo, event.branch
            );
            let body = event.to_string();
            sender.publish(event);
            (Status::Ok, body)
        }
        Ok(Extraction::Ignored(reason)) => {
            debug!("ignoring {} delivery: {}", kind, reason);
            (Status::Ok, String::new())
        }
        Err(err) => {
            warn!("couldn't extract an event from {} delivery: {}", kind, err);
            (Status::InternalServerError, err.to_string())
        }
    }
}

/// GitHub only ever POSTs deliveries; answer probes with an explicit 405
/// instead of rocket's catch-all 404.
#[rocket::get("/")]
pub(crate) fn method_not_allowed() -> Status {
    Status::MethodNotAllowed
}

/// Builds the rocket serving the webhook endpoint at the configured path,
/// with the config and the queue's producer half as managed state.
pub fn rocket(config: ServerConfig, sender: EventSender) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("port", config.port))
        .merge(("address", "0.0.0.0"));
    let path = config.path.clone();

    rocket::custom(figment)
        .mount(
            path.as_str(),
            rocket::routes![postreceive, method_not_allowed],
        )
        .manage(config)
        .manage(sender)
}
