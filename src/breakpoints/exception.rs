//! Exception breakpoint catalog
//!
//! One filter per language and exception kind, advertised to the client in
//! the `initialize` response and toggled by `setExceptionBreakpoints`. The
//! catalog is built lazily from the engine's language metadata the first
//! time anything asks for it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::common::Result;
use crate::dap::ExceptionBreakpointsFilter;
use crate::engine::{BreakpointId, DebugEngine, Language};

use super::classify_stop;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Catch,
    Throw,
}

/// One client-visible exception filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionBreakpoint {
    pub filter: String,
    pub label: String,
    pub language: Language,
    pub kind: ExceptionKind,
    /// Engine breakpoint while the filter is enabled
    pub breakpoint: Option<BreakpointId>,
}

impl ExceptionBreakpoint {
    fn new(
        filter: impl Into<String>,
        label: impl Into<String>,
        language: Language,
        kind: ExceptionKind,
    ) -> Self {
        Self {
            filter: filter.into(),
            label: label.into(),
            language,
            kind,
            breakpoint: None,
        }
    }

    fn enable<E: DebugEngine>(&mut self, engine: &E) -> Result<()> {
        if self.breakpoint.is_some() {
            return Ok(());
        }
        let on_catch = self.kind == ExceptionKind::Catch;
        let id = engine.create_exception_breakpoint(&self.language, on_catch, !on_catch)?;
        tracing::debug!(filter = %self.filter, id, "Enabled exception breakpoint");
        self.breakpoint = Some(id);
        Ok(())
    }

    fn disable<E: DebugEngine>(&mut self, engine: &E) -> Result<()> {
        if let Some(id) = self.breakpoint.take() {
            engine.remove_breakpoint(id)?;
            tracing::debug!(filter = %self.filter, id, "Disabled exception breakpoint");
        }
        Ok(())
    }
}

/// Lazily built list of exception filters
#[derive(Debug, Default)]
pub struct ExceptionBreakpointCatalog {
    populated: AtomicBool,
    breakpoints: Mutex<Vec<ExceptionBreakpoint>>,
}

impl ExceptionBreakpointCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ExceptionBreakpoint>> {
        self.breakpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the catalog once; later calls are no-ops
    pub fn populate<E: DebugEngine>(&self, engine: &E) {
        if self.populated.load(Ordering::Acquire) {
            return;
        }

        let mut breakpoints = self.lock();
        if self.populated.load(Ordering::Acquire) {
            return;
        }

        *breakpoints = build_catalog(engine);
        tracing::debug!(count = breakpoints.len(), "Populated exception breakpoints");
        self.populated.store(true, Ordering::Release);
    }

    fn populated_lock<E: DebugEngine>(&self, engine: &E) -> MutexGuard<'_, Vec<ExceptionBreakpoint>> {
        self.populate(engine);
        self.lock()
    }

    pub fn get_by_filter<E: DebugEngine>(&self, engine: &E, filter: &str) -> Option<ExceptionBreakpoint> {
        self.populated_lock(engine)
            .iter()
            .find(|bp| bp.filter == filter)
            .cloned()
    }

    pub fn get_by_breakpoint_id<E: DebugEngine>(
        &self,
        engine: &E,
        id: BreakpointId,
    ) -> Option<ExceptionBreakpoint> {
        self.populated_lock(engine)
            .iter()
            .find(|bp| bp.breakpoint == Some(id))
            .cloned()
    }

    /// Filters for the `exceptionBreakpointFilters` capability
    pub fn filters<E: DebugEngine>(&self, engine: &E) -> Vec<ExceptionBreakpointsFilter> {
        self.populated_lock(engine)
            .iter()
            .map(|bp| ExceptionBreakpointsFilter {
                filter: bp.filter.clone(),
                label: bp.label.clone(),
                default: false,
            })
            .collect()
    }

    /// Enable exactly the listed filters
    ///
    /// Returns the requested filter IDs the catalog does not know. Every
    /// filter is applied even when the engine rejects one; the first engine
    /// error is returned afterwards.
    pub fn set_filters<E: DebugEngine>(&self, engine: &E, filters: &[String]) -> Result<Vec<String>> {
        let requested: HashSet<&str> = filters.iter().map(String::as_str).collect();
        let mut breakpoints = self.populated_lock(engine);

        let mut first_error = None;
        for bp in breakpoints.iter_mut() {
            let result = if requested.contains(bp.filter.as_str()) {
                bp.enable(engine)
            } else {
                bp.disable(engine)
            };
            if let Err(e) = result {
                tracing::warn!(filter = %bp.filter, "Failed to update exception breakpoint: {}", e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let unknown = filters
            .iter()
            .filter(|filter| !breakpoints.iter().any(|bp| &bp.filter == *filter))
            .cloned()
            .collect();
        Ok(unknown)
    }

    /// The exception filter responsible for a stop, if every hit is one
    pub fn from_stop_reason<E: DebugEngine>(&self, engine: &E, data: &[u64]) -> Option<ExceptionBreakpoint> {
        let breakpoints = self.populated_lock(engine);
        classify_stop(data, |id| {
            breakpoints.iter().find(|bp| bp.breakpoint == Some(id)).cloned()
        })
    }
}

fn build_catalog<E: DebugEngine>(engine: &E) -> Vec<ExceptionBreakpoint> {
    let curated = [
        (Language::CPlusPlus, "cpp", "C++"),
        (Language::ObjC, "objc", "Objective-C"),
        (Language::Swift, "swift", "Swift"),
    ];

    let mut breakpoints = Vec::new();
    for (language, prefix, display) in curated {
        if !engine.supports_language(&language) {
            continue;
        }
        breakpoints.push(ExceptionBreakpoint::new(
            format!("{prefix}_catch"),
            format!("{display} Catch"),
            language.clone(),
            ExceptionKind::Catch,
        ));
        breakpoints.push(ExceptionBreakpoint::new(
            format!("{prefix}_throw"),
            format!("{display} Throw"),
            language,
            ExceptionKind::Throw,
        ));
    }

    for language in engine.languages() {
        if language.is_c_family() || language == Language::Swift {
            continue;
        }
        if !engine.supports_language(&language) {
            continue;
        }

        let name = language.name().to_string();
        let support = engine.exception_support(&language);

        if support.on_throw {
            let keyword = support.throw_keyword.as_deref().unwrap_or("throw");
            breakpoints.push(ExceptionBreakpoint::new(
                format!("{name}_{keyword}"),
                format!("{} {}", capitalize(&name), capitalize(keyword)),
                language.clone(),
                ExceptionKind::Throw,
            ));
        }
        if support.on_catch {
            let keyword = support.catch_keyword.as_deref().unwrap_or("catch");
            breakpoints.push(ExceptionBreakpoint::new(
                format!("{name}_{keyword}"),
                format!("{} {}", capitalize(&name), capitalize(keyword)),
                language,
                ExceptionKind::Catch,
            ));
        }
    }

    breakpoints
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExceptionSupport;
    use crate::testing::MockEngine;
    use std::sync::Arc;

    fn filter_ids(catalog: &ExceptionBreakpointCatalog, engine: &MockEngine) -> Vec<String> {
        catalog.filters(engine).into_iter().map(|f| f.filter).collect()
    }

    #[test]
    fn test_population_order() {
        let engine = MockEngine::new();
        engine.set_language(
            Language::Other("go".into()),
            true,
            ExceptionSupport {
                on_throw: true,
                on_catch: true,
                throw_keyword: None,
                catch_keyword: Some("recover".into()),
            },
        );
        engine.set_language(
            Language::Other("python".into()),
            false,
            ExceptionSupport {
                on_throw: true,
                ..Default::default()
            },
        );

        let catalog = ExceptionBreakpointCatalog::new();
        assert_eq!(
            filter_ids(&catalog, &engine),
            vec!["cpp_catch", "cpp_throw", "rust_panic", "go_throw", "go_recover"]
        );

        let go = catalog.get_by_filter(&engine, "go_recover").unwrap();
        assert_eq!(go.label, "Go Recover");
        assert_eq!(go.kind, ExceptionKind::Catch);
        assert_eq!(
            catalog.get_by_filter(&engine, "rust_panic").unwrap().label,
            "Rust Panic"
        );
    }

    #[test]
    fn test_curated_languages_are_not_rescanned() {
        let engine = MockEngine::new();
        engine.set_language(Language::Swift, true, ExceptionSupport {
            on_throw: true,
            on_catch: true,
            ..Default::default()
        });

        let catalog = ExceptionBreakpointCatalog::new();
        let ids = filter_ids(&catalog, &engine);
        assert_eq!(ids.iter().filter(|id| id.starts_with("swift_")).count(), 2);
        assert_eq!(catalog.get_by_filter(&engine, "swift_catch").unwrap().label, "Swift Catch");
    }

    #[test]
    fn test_populated_once() {
        let engine = MockEngine::new();
        let catalog = ExceptionBreakpointCatalog::new();
        catalog.populate(&engine);

        engine.set_language(Language::Other("zig".into()), true, ExceptionSupport {
            on_throw: true,
            ..Default::default()
        });
        catalog.populate(&engine);
        assert!(catalog.get_by_filter(&engine, "zig_throw").is_none());
    }

    #[test]
    fn test_concurrent_population() {
        let engine = Arc::new(MockEngine::new());
        let catalog = Arc::new(ExceptionBreakpointCatalog::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let catalog = catalog.clone();
                std::thread::spawn(move || catalog.filters(engine.as_ref()).len())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 3);
        }
    }

    #[test]
    fn test_set_filters_toggles_engine_breakpoints() {
        let engine = MockEngine::new();
        let catalog = ExceptionBreakpointCatalog::new();

        let unknown = catalog
            .set_filters(&engine, &["cpp_throw".into(), "java_throw".into()])
            .unwrap();
        assert_eq!(unknown, vec!["java_throw"]);

        let id = catalog.get_by_filter(&engine, "cpp_throw").unwrap().breakpoint.unwrap();
        assert_eq!(catalog.get_by_breakpoint_id(&engine, id).unwrap().filter, "cpp_throw");
        assert_eq!(engine.breakpoints().len(), 1);

        catalog.set_filters(&engine, &[]).unwrap();
        assert!(engine.breakpoints().is_empty());
        assert!(catalog.get_by_breakpoint_id(&engine, id).is_none());
    }

    #[test]
    fn test_set_filters_applies_all_before_failing() {
        let engine = MockEngine::new();
        let catalog = ExceptionBreakpointCatalog::new();
        catalog.set_filters(&engine, &["cpp_catch".into()]).unwrap();

        // C++ plugin goes away after the catalog was built
        engine.set_language(Language::CPlusPlus, false, ExceptionSupport::default());
        let err = catalog
            .set_filters(&engine, &["cpp_throw".into(), "rust_panic".into()])
            .unwrap_err();
        assert!(err.to_string().contains("c++"));

        assert!(catalog.get_by_filter(&engine, "cpp_catch").unwrap().breakpoint.is_none());
        assert!(catalog.get_by_filter(&engine, "cpp_throw").unwrap().breakpoint.is_none());
        assert!(catalog.get_by_filter(&engine, "rust_panic").unwrap().breakpoint.is_some());
        assert_eq!(engine.breakpoints().len(), 1);
    }

    #[test]
    fn test_mixed_hit_is_not_an_exception_stop() {
        let engine = MockEngine::new();
        let catalog = ExceptionBreakpointCatalog::new();
        catalog.set_filters(&engine, &["cpp_throw".into()]).unwrap();
        let exception_id = catalog.get_by_filter(&engine, "cpp_throw").unwrap().breakpoint.unwrap();
        let ordinary_id = engine.create_address_breakpoint(0x1000).unwrap();

        let hit = catalog.from_stop_reason(&engine, &[exception_id as u64, 1]);
        assert_eq!(hit.unwrap().filter, "cpp_throw");

        let mixed = [exception_id as u64, 1, ordinary_id as u64, 1];
        assert!(catalog.from_stop_reason(&engine, &mixed).is_none());
        assert!(catalog.from_stop_reason(&engine, &[]).is_none());
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("rust"), "Rust");
        assert_eq!(capitalize(""), "");
    }
}
