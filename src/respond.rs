//! Flushes the staged response once the pipeline succeeds.
//!
//! Rules are checked in order and the first match wins; every branch ends
//! in at most one call to [`RawResponse::end`](crate::RawResponse::end).
//!
//! | Staged state | Written |
//! |---|---|
//! | responder turned off, or transport gone | nothing |
//! | status forbids a body (204, 205, 304) | empty, entity headers stripped |
//! | `HEAD` request | empty, `Content-Length` of the staged body |
//! | body cleared explicitly | empty, no `Content-Type` / `Transfer-Encoding` |
//! | no body | reason phrase (HTTP/1) or status code (HTTP/2+) as text |
//! | bytes / text | verbatim |
//! | stream | piped |
//! | JSON | serialized, with `Content-Length` |

use http::header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};

use crate::context::Context;
use crate::response::Body;
use crate::status;
use crate::transport;

pub(crate) fn respond(ctx: &mut Context) {
    if !ctx.respond() || !ctx.writable() {
        return;
    }

    let code = ctx.status().as_u16();
    let head = ctx.request().is_head();
    let version_major = ctx.request().http_version_major();
    let res = ctx.response_mut();

    if status::is_empty_body(code) {
        res.clear_body();
        res.raw_mut().end(transport::empty());
        return;
    }

    if head {
        if !res.headers_sent() && !res.has_header(CONTENT_LENGTH) {
            if let Some(length) = res.length() {
                res.set_length(length);
            }
        }
        res.raw_mut().end(transport::empty());
        return;
    }

    let Some(body) = res.take_body() else {
        if res.explicit_null_body() {
            res.remove_header(CONTENT_TYPE);
            res.remove_header(TRANSFER_ENCODING);
            res.raw_mut().end(transport::empty());
            return;
        }
        let text = match res.message() {
            message if version_major < 2 && !message.is_empty() => message.to_owned(),
            _ => code.to_string(),
        };
        if !res.headers_sent() {
            res.set_type("text");
            res.set_length(text.len() as u64);
        }
        res.raw_mut().end(transport::full(text));
        return;
    };

    let payload = match body {
        Body::Bytes(bytes) => transport::full(bytes),
        Body::Text(text) => transport::full(text),
        Body::Stream(stream) => transport::stream(stream),
        Body::Json(value) => {
            let text = value.to_string();
            if !res.headers_sent() {
                res.set_length(text.len() as u64);
            }
            transport::full(text)
        }
    };
    res.raw_mut().end(payload);
}
