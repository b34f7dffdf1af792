//! Document Lifecycle Routes
//!
//! Built-in routes for the `textDocument/didOpen|didChange|didSave|didClose`
//! notifications that keep the [`DocumentStore`] synchronized with the
//! client. Range-based changes are converted to byte edits against the
//! currently tracked snapshot.

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::document::{ContentChange, DocumentStore};
use crate::error::DocumentError;
use crate::protocol::ResponseError;
use crate::server::router::{Exchange, Router};

pub const DID_OPEN: &str = "textDocument/didOpen";
pub const DID_CHANGE: &str = "textDocument/didChange";
pub const DID_SAVE: &str = "textDocument/didSave";
pub const DID_CLOSE: &str = "textDocument/didClose";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextDocumentItem {
    uri: String,
    language_id: String,
    version: i32,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextDocumentIdentifier {
    uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionedTextDocumentIdentifier {
    uri: String,
    version: i32,
}

#[derive(Debug, Deserialize)]
struct Position {
    line: u32,
    character: u32,
}

#[derive(Debug, Deserialize)]
struct Range {
    start: Position,
    end: Position,
}

#[derive(Debug, Deserialize)]
struct TextDocumentContentChange {
    range: Option<Range>,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidOpenParams {
    text_document: TextDocumentItem,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidChangeParams {
    text_document: VersionedTextDocumentIdentifier,
    content_changes: Vec<TextDocumentContentChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidSaveParams {
    text_document: TextDocumentIdentifier,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidCloseParams {
    text_document: TextDocumentIdentifier,
}

/// Install the lifecycle routes on a router. Called once at server startup.
pub fn register(router: Router, documents: Arc<DocumentStore>) -> Router {
    let docs = Arc::clone(&documents);
    let router = router.route(DID_OPEN, move |ex: Exchange| {
        let docs = Arc::clone(&docs);
        async move {
            let p: DidOpenParams = parse_params(ex.params)?;
            let item = p.text_document;
            docs.open(&item.uri, &item.language_id, item.version, item.text)
                .await;
            Ok(Value::Null)
        }
    });

    let docs = Arc::clone(&documents);
    let router = router.route(DID_CHANGE, move |ex: Exchange| {
        let docs = Arc::clone(&docs);
        async move {
            let p: DidChangeParams = parse_params(ex.params)?;
            let uri = p.text_document.uri;
            let version = p.text_document.version;
            // Each change applies to the buffer produced by the previous
            // one, so ranges must be resolved against the latest snapshot.
            for change in p.content_changes {
                let change = match change.range {
                    None => ContentChange::Full { text: change.text },
                    Some(range) => {
                        let doc = docs
                            .get(&uri)
                            .await
                            .ok_or_else(|| document_error(DocumentError::NotOpen(uri.clone())))?;
                        let offset = doc
                            .offset_at(range.start.line, range.start.character)
                            .map_err(document_error)?;
                        let end = doc
                            .offset_at(range.end.line, range.end.character)
                            .map_err(document_error)?;
                        ContentChange::Incremental {
                            offset,
                            length: end.saturating_sub(offset),
                            text: change.text,
                        }
                    }
                };
                docs.change(&uri, std::slice::from_ref(&change), version)
                    .await
                    .map_err(document_error)?;
            }
            Ok(Value::Null)
        }
    });

    let docs = Arc::clone(&documents);
    let router = router.route(DID_SAVE, move |ex: Exchange| {
        let docs = Arc::clone(&docs);
        async move {
            let p: DidSaveParams = parse_params(ex.params)?;
            docs.save(&p.text_document.uri, p.text)
                .await
                .map_err(document_error)?;
            Ok(Value::Null)
        }
    });

    let docs = Arc::clone(&documents);
    router.route(DID_CLOSE, move |ex: Exchange| {
        let docs = Arc::clone(&docs);
        async move {
            let p: DidCloseParams = parse_params(ex.params)?;
            docs.close(&p.text_document.uri)
                .await
                .map_err(document_error)?;
            Ok(Value::Null)
        }
    })
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, ResponseError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| ResponseError::invalid_params(&e.to_string()))
}

fn document_error(err: DocumentError) -> ResponseError {
    ResponseError::internal_error(&err.to_string())
}
