use crate::heuristics;
use crate::paths;
use crate::rank;
use crate::rank::RankedMatch;
use crate::rank::STRONG_DEFINITION_SCORE;
use crate::search;
use crate::search::GrepMatch;
use crate::server::InFlight;
use crate::server::SessionState;
use crate::uri::file_uri_to_path;
use crate::uri::path_to_file_uri;
use anyhow::Result;
use serde_json::json;
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::PoisonError;

const SOURCE_EXTENSIONS: &str = "c,cc,cpp,cxx,h,hh,hpp,hxx";
const WORKSPACE_SYMBOL_CAP: usize = 50;
const LOOKUP_CAP: usize = 20;
const REFERENCES_CAP: usize = 50;

fn get_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn get_int(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or(0)
}

struct Cursor {
    uri: String,
    line0: usize,
    ch0: usize,
}

fn cursor_from_params(params: &Value) -> Option<Cursor> {
    let document = params.get("textDocument")?;
    let uri = get_str(document, "uri");
    if uri.is_empty() {
        return None;
    }
    let position = params.get("position").cloned().unwrap_or_default();
    let line0 = get_int(&position, "line");
    let ch0 = get_int(&position, "character");
    if line0 < 0 || ch0 < 0 {
        return None;
    }
    Some(Cursor {
        uri: uri.to_string(),
        line0: line0 as usize,
        ch0: ch0 as usize,
    })
}

/// The searched token plus the cursor's own location, both snapshotted from
/// the document store before any child process is spawned.
struct Subject {
    symbol: String,
    current_abs: String,
    current_line1: u32,
}

fn resolve_subject(state: &SessionState, root: &str, cursor: &Cursor) -> Option<Subject> {
    let text = state.docs.snapshot(&cursor.uri)?;
    if heuristics::cursor_in_line_comment(&text, cursor.line0, cursor.ch0) {
        return None;
    }
    let symbol = heuristics::word_at(&text, cursor.line0, cursor.ch0)?;
    if heuristics::is_stop_word(&symbol) {
        return None;
    }
    Some(Subject {
        symbol,
        current_abs: paths::absolutize(root, &file_uri_to_path(&cursor.uri)),
        current_line1: cursor.line0 as u32 + 1,
    })
}

fn root_dir(state: &SessionState) -> String {
    let roots = state.roots.read().unwrap_or_else(PoisonError::into_inner);
    if !roots.root_path.is_empty() {
        return roots.root_path.clone();
    }
    if !roots.root_uri.is_empty() {
        return file_uri_to_path(&roots.root_uri);
    }
    ".".to_string()
}

async fn run_search(
    state: &SessionState,
    root: &str,
    needle: &str,
    cap: usize,
    inflight: &InFlight,
) -> Vec<GrepMatch> {
    if state.serve_files.is_empty() {
        search::grep_workspace(
            root,
            needle,
            cap,
            Some(SOURCE_EXTENSIONS),
            &inflight.cancelled,
            &inflight.child_pid,
        )
        .await
    } else {
        search::grep_files(
            &state.serve_files,
            needle,
            cap,
            &inflight.cancelled,
            &inflight.child_pid,
        )
        .await
    }
}

fn location_json(abs_path: &str, line1: u32, column0: u32, token_len: usize) -> Value {
    json!({
        "uri": path_to_file_uri(abs_path),
        "range": {
            "start": {"line": line1 - 1, "character": column0},
            "end": {"line": line1 - 1, "character": column0 + token_len as u32},
        },
    })
}

pub(crate) fn initialize(state: &SessionState, params: &Value) -> Value {
    let mut root_uri = get_str(params, "rootUri").to_string();
    let mut root_path = get_str(params, "rootPath").to_string();
    if root_path.is_empty() && !root_uri.is_empty() {
        root_path = file_uri_to_path(&root_uri);
    }
    if root_uri.is_empty() && !root_path.is_empty() {
        root_uri = path_to_file_uri(&root_path);
    }
    {
        let mut roots = state.roots.write().unwrap_or_else(PoisonError::into_inner);
        roots.root_uri = root_uri;
        roots.root_path = root_path;
    }

    // vscode-clangd sends initializationOptions: {clangdFileStatus: true, ...}
    let file_status = params
        .get("initializationOptions")
        .and_then(|options| options.get("clangdFileStatus"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    state.file_status.store(file_status, Ordering::Relaxed);

    json!({
        "capabilities": {
            "textDocumentSync": {"openClose": true, "change": 1},
            "hoverProvider": true,
            "definitionProvider": true,
            "referencesProvider": true,
            "workspaceSymbolProvider": true,
        },
        "serverInfo": {"name": "super-lazy-clangd", "version": "0.1.0"},
    })
}

pub(crate) async fn workspace_symbol(
    state: &SessionState,
    params: &Value,
    inflight: &InFlight,
) -> Result<Value> {
    let query = get_str(params, "query").to_string();
    let root = root_dir(state);
    let matches = run_search(state, &root, &query, WORKSPACE_SYMBOL_CAP, inflight).await;
    let ranked = rank::rank_matches(matches, &query, "", 0, "", |p| paths::absolutize(&root, p));

    let symbols: Vec<Value> = ranked
        .iter()
        .map(|r| {
            json!({
                "name": query.as_str(),
                "kind": 13,  // Variable (arbitrary; we're grep-based)
                "location": location_json(&r.abs_path, r.hit.line, r.hit.column, query.len()),
                "containerName": r.abs_path.as_str(),
            })
        })
        .collect();
    Ok(Value::Array(symbols))
}

pub(crate) async fn hover(
    state: &SessionState,
    params: &Value,
    inflight: &InFlight,
) -> Result<Value> {
    let Some(cursor) = cursor_from_params(params) else {
        return Ok(Value::Null);
    };
    let root = root_dir(state);
    let Some(subject) = resolve_subject(state, &root, &cursor) else {
        return Ok(Value::Null);
    };

    let matches = run_search(state, &root, &subject.symbol, LOOKUP_CAP, inflight).await;
    let ranked = rank::rank_matches(
        matches,
        &subject.symbol,
        &subject.current_abs,
        subject.current_line1,
        &subject.current_abs,
        |p| paths::absolutize(&root, p),
    );
    let Some(best) = ranked.first() else {
        return Ok(Value::Null);
    };

    let value = format!(
        "**super-lazy-clangd** (grep)\n\nFound `{}:{}`\n\n```cpp\n{}\n```",
        best.abs_path, best.hit.line, best.hit.text
    );
    Ok(json!({
        "contents": {"kind": "markdown", "value": value},
        "range": {
            "start": {"line": cursor.line0, "character": cursor.ch0},
            "end": {"line": cursor.line0, "character": cursor.ch0},
        },
    }))
}

pub(crate) async fn definition(
    state: &SessionState,
    params: &Value,
    inflight: &InFlight,
) -> Result<Value> {
    let Some(cursor) = cursor_from_params(params) else {
        return Ok(Value::Null);
    };
    let root = root_dir(state);
    let Some(subject) = resolve_subject(state, &root, &cursor) else {
        return Ok(Value::Null);
    };

    let matches = run_search(state, &root, &subject.symbol, LOOKUP_CAP, inflight).await;
    // Declaration shape decides here, not file locality: no preferred path.
    let ranked = rank::rank_matches(
        matches,
        &subject.symbol,
        &subject.current_abs,
        subject.current_line1,
        "",
        |p| paths::absolutize(&root, p),
    );
    if ranked.is_empty() {
        return Ok(Value::Null);
    }

    // A single strong definition-shaped hit goes out alone so the editor
    // jumps straight to it instead of showing a chooser.
    let strong: Vec<&RankedMatch> = ranked
        .iter()
        .filter(|r| r.score >= STRONG_DEFINITION_SCORE)
        .collect();
    let chosen: Vec<&RankedMatch> = if strong.len() == 1 {
        strong
    } else {
        ranked.iter().collect()
    };

    let locations: Vec<Value> = chosen
        .iter()
        .map(|r| location_json(&r.abs_path, r.hit.line, r.hit.column, subject.symbol.len()))
        .collect();
    Ok(Value::Array(locations))
}

pub(crate) async fn references(
    state: &SessionState,
    params: &Value,
    inflight: &InFlight,
) -> Result<Value> {
    let Some(cursor) = cursor_from_params(params) else {
        return Ok(json!([]));
    };
    let root = root_dir(state);
    let Some(subject) = resolve_subject(state, &root, &cursor) else {
        return Ok(json!([]));
    };

    let matches = run_search(state, &root, &subject.symbol, REFERENCES_CAP, inflight).await;
    let ranked = rank::rank_matches(
        matches,
        &subject.symbol,
        &subject.current_abs,
        subject.current_line1,
        &subject.current_abs,
        |p| paths::absolutize(&root, p),
    );

    let locations: Vec<Value> = ranked
        .iter()
        .map(|r| location_json(&r.abs_path, r.hit.line, r.hit.column, subject.symbol.len()))
        .collect();
    Ok(Value::Array(locations))
}
