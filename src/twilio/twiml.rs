//! Minimal TwiML generation for webhook responses

/// Content type Twilio expects on TwiML responses
pub const CONTENT_TYPE: &str = "text/xml";

/// Voice response that speaks a short line and hangs up
///
/// Used to answer forwarded calls politely while the text-back goes out over
/// SMS. An optional `<Pause>` before the hangup keeps the line open long
/// enough that the tail of the message is not clipped.
#[must_use]
pub fn voice_say_hangup(text: &str, pause_secs: Option<u32>) -> String {
    let pause = pause_secs.map_or_else(String::new, |secs| {
        format!("\n  <Pause length=\"{secs}\"/>")
    });
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n  <Say>{}</Say>{pause}\n  <Hangup/>\n</Response>",
        escape_xml(text)
    )
}

/// Messaging response carrying an inline reply
#[must_use]
pub fn message_response(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n  <Message>{}</Message>\n</Response>",
        escape_xml(body)
    )
}

/// Empty response: acknowledge the webhook, reply out-of-band (or not at all)
#[must_use]
pub fn empty_response() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response/>".to_string()
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
