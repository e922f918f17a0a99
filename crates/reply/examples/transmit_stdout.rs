//! Writes a few responses to stdout, the way they would go over a socket.
//!
//! ```sh
//! cargo run -p micro-reply --example transmit_stdout
//! ```

use http::header::{ACCEPT_ENCODING, IF_NONE_MATCH};
use http::{HeaderValue, StatusCode};
use micro_reply::{Envelope, HttpError, Json, RequestHead, Transmitter};
use serde_json::json;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let transmitter = Transmitter::builder().build();

    let (mut conn, _signals) = transmitter.connect(RequestHead::get("/user/7"), tokio::io::stdout());
    transmitter.send((StatusCode::OK, Json(json!({"id": 7, "name": "zava"}))), &mut conn).await;
    println!("\n");

    let request = RequestHead::get("/cached").with_header(IF_NONE_MATCH, HeaderValue::from_static("\"v7\""));
    let (mut conn, _signals) = transmitter.connect(request, tokio::io::stdout());
    transmitter.send(Envelope::text("unchanged").header("etag", "\"v7\""), &mut conn).await;
    println!("\n");

    let request = RequestHead::get("/missing").with_header(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    let (mut conn, _signals) = transmitter.connect(request, tokio::io::stdout());
    transmitter.send(HttpError::not_found("no such page"), &mut conn).await;
    println!();
}
