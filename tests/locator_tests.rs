#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Tests for handler location and classification
//!
//! Units are served from a temporary code directory holding placeholder
//! files; `StaticLoader` maps each placeholder to handlers linked into this
//! binary, so every path through the locator runs without a compiled unit.

mod common;

use brrtserve::handler::search_path;
use brrtserve::{
    classify, CodeLocator, ExecutionKind, HandlerEntry, InvocationRequest, ServerError,
};
use common::fixtures::{code_dir_with, StaticLoader, StaticUnit};
use common::handlers;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn locator_for(module: &str) -> (CodeLocator, Arc<AtomicUsize>) {
    let loader = StaticLoader::default().with_unit(
        module,
        StaticUnit::default()
            .with("handler", HandlerEntry::Blocking(handlers::echo))
            .with(
                "handler_async",
                HandlerEntry::Suspendable(handlers::echo_async),
            ),
    );
    let loads = loader.load_count();
    (CodeLocator::with_loader(loader), loads)
}

#[test]
fn test_locate_blocking_handler() {
    let dir = code_dir_with(&["inference"]);
    let (locator, loads) = locator_for("inference");

    let bound = locator
        .locate_reference(dir.path(), "inference.handler")
        .unwrap();
    assert_eq!(bound.reference().module_name, "inference");
    assert_eq!(bound.reference().symbol_name, "handler");
    assert_eq!(classify(&bound), ExecutionKind::Blocking);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_locate_suspendable_handler() {
    let dir = code_dir_with(&["inference"]);
    let (locator, _) = locator_for("inference");

    let bound = locator
        .locate_reference(dir.path(), "inference.handler_async")
        .unwrap();
    assert_eq!(classify(&bound), ExecutionKind::Suspendable);
}

#[test]
fn test_malformed_references_fail_before_loading() {
    let dir = code_dir_with(&["inference"]);
    let (locator, loads) = locator_for("inference");

    for reference in ["inference", "a.b.c", ".handler", "inference.", ""] {
        match locator.locate_reference(dir.path(), reference) {
            Err(ServerError::InvalidReference { reference: got }) => assert_eq!(got, reference),
            other => panic!("expected InvalidReference for {reference:?}, got {other:?}"),
        }
    }
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

#[test]
fn test_missing_symbol() {
    let dir = code_dir_with(&["inference"]);
    let (locator, _) = locator_for("inference");

    match locator.locate_reference(dir.path(), "inference.predict") {
        Err(ServerError::SymbolNotFound { symbol, module }) => {
            assert_eq!(symbol, "predict");
            assert_eq!(module, "inference");
        }
        other => panic!("expected SymbolNotFound, got {other:?}"),
    }
}

#[test]
fn test_missing_module() {
    let dir = code_dir_with(&["inference"]);
    let (locator, loads) = locator_for("inference");

    match locator.locate_reference(dir.path(), "model.handler") {
        Err(ServerError::CodeNotFound { path, reason }) => {
            assert_eq!(path.parent(), Some(dir.path()));
            assert!(reason.is_none());
        }
        other => panic!("expected CodeNotFound, got {other:?}"),
    }
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

#[test]
fn test_loader_rejection_is_code_not_found() {
    // File exists but the loader has no unit for it
    let dir = code_dir_with(&["stray"]);
    let (locator, _) = locator_for("inference");

    match locator.locate_reference(dir.path(), "stray.handler") {
        Err(ServerError::CodeNotFound { reason, .. }) => {
            assert!(reason.unwrap().contains("stray"));
        }
        other => panic!("expected CodeNotFound, got {other:?}"),
    }
}

fn blocking_fn(bound: &brrtserve::BoundHandler) -> brrtserve::handler::BlockingFn {
    match bound.entry() {
        HandlerEntry::Blocking(func) => func,
        HandlerEntry::Suspendable(_) => panic!("expected a blocking entry"),
    }
}

#[test]
fn test_locating_twice_binds_same_handler() {
    let dir = code_dir_with(&["inference"]);
    let (locator, _) = locator_for("inference");

    let first = locator
        .locate_reference(dir.path(), "inference.handler")
        .unwrap();
    let second = locator
        .locate_reference(dir.path(), "inference.handler")
        .unwrap();

    assert_eq!(first.reference(), second.reference());
    assert_eq!(classify(&first), classify(&second));
    assert_eq!(
        blocking_fn(&first) as usize,
        blocking_fn(&second) as usize
    );

    let a = blocking_fn(&first)(InvocationRequest::new(b"same input".to_vec())).unwrap();
    let b = blocking_fn(&second)(InvocationRequest::new(b"same input".to_vec())).unwrap();
    assert_eq!(a, b);

    assert!(search_path::contains(dir.path()));
    let canonical = dir.path().canonicalize().unwrap();
    let occurrences = search_path::registered()
        .into_iter()
        .filter(|p| *p == canonical)
        .count();
    assert_eq!(occurrences, 1);
}

#[test]
fn test_native_loader_rejects_non_library() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(libloading::library_filename("garbage")),
        b"\x7fNOT-AN-ELF",
    )
    .unwrap();

    let err = CodeLocator::new()
        .locate_reference(dir.path(), "garbage.handler")
        .unwrap_err();
    assert!(matches!(
        err,
        ServerError::CodeNotFound {
            reason: Some(_),
            ..
        }
    ));
    assert!(err.to_string().contains("could not be loaded"));
}

#[test]
fn test_error_messages_name_the_reference() {
    let err = CodeLocator::new()
        .locate_reference(Path::new("/nonexistent"), "nodot")
        .unwrap_err();
    assert!(err.to_string().contains("`nodot`"));
}
