use std::{cell::RefCell, path::Path};

use esedump::{
    engine::header::FileType,
    error::{DbResult, Error},
    repair::RepairTool,
    session::{OpenTier, Session, SessionOptions},
};

mod test_utils;

use test_utils::{FakeEngine, FakeRepair, TestFile};

fn consenting() -> SessionOptions {
    SessionOptions {
        allow_destructive_recovery: true,
        ..SessionOptions::default()
    }
}

#[test]
fn test_open_direct() {
    let engine = FakeEngine::new();
    let repair = FakeRepair::default();
    let file = TestFile::new();

    let options = SessionOptions::default();
    let session = Session::open(&engine, &repair, file.path(), &options).unwrap();
    assert_eq!(session.tier(), OpenTier::Direct);
    assert!(repair.calls().is_empty());

    let calls = engine.calls();
    let position = |call: &str| calls.iter().position(|c| c == call).unwrap();
    assert!(position("file_type") < position("create_instance"));
    assert!(position("set_param:page_size=8192") < position("create_instance"));
    assert!(position("init_instance") < position("begin_session"));
    assert!(position("attach_database") < position("open_database"));
    assert_eq!(engine.count("set_param:recovery=true"), 1);
    assert_eq!(engine.count("set_param:circular_log=false"), 1);
    assert_eq!(engine.count("set_param:base_name=edb"), 1);

    session.close().unwrap();
}

#[test]
fn test_page_size_hint_accepted() {
    let engine = FakeEngine::new();
    let file = TestFile::new();
    let options = SessionOptions {
        page_size: Some(32 * 1024),
        ..SessionOptions::default()
    };

    let session = Session::open(&engine, &FakeRepair::default(), file.path(), &options).unwrap();
    assert_eq!(engine.count("page_size"), 0);
    assert_eq!(engine.count("set_param:page_size=32768"), 1);
    session.close().unwrap();
}

#[test]
fn test_page_size_hint_ignored() {
    for hint in [None, Some(0), Some(1000), Some(4097)] {
        let engine = FakeEngine::new();
        let file = TestFile::new();
        let options = SessionOptions {
            page_size: hint,
            ..SessionOptions::default()
        };

        let session =
            Session::open(&engine, &FakeRepair::default(), file.path(), &options).unwrap();
        assert_eq!(engine.count("page_size"), 1, "hint {hint:?} must be ignored");
        assert_eq!(engine.count("set_param:page_size=8192"), 1);
        session.close().unwrap();
    }
}

#[test]
fn test_missing_file() {
    let engine = FakeEngine::new();
    let path = TestFile::missing();

    let error = Session::open(&engine, &FakeRepair::default(), &path, &consenting()).unwrap_err();
    assert!(matches!(error, Error::FileNotFound(p) if p == path));
    assert!(engine.calls().is_empty());
}

#[test]
fn test_not_a_database() {
    let mut engine = FakeEngine::new();
    engine.file_type = FileType::StreamingFile;
    let file = TestFile::new();

    let error =
        Session::open(&engine, &FakeRepair::default(), file.path(), &consenting()).unwrap_err();
    assert!(matches!(error, Error::NotADatabase { file_type: 1, .. }));
    assert!(error.is_open_error());
    assert_eq!(engine.count("create_instance"), 0);
    assert_eq!(engine.count("set_param:page_size=8192"), 0);
}

#[test]
fn test_open_after_recovery() {
    let engine = FakeEngine::new().fail("open_database", 1);
    let repair = FakeRepair::default();
    let file = TestFile::new();

    let session = Session::open(&engine, &repair, file.path(), &consenting()).unwrap();
    assert_eq!(session.tier(), OpenTier::AfterRecovery);
    assert_eq!(repair.calls(), ["recover:edb"]);
    // The failed open released the database before recovery ran.
    assert_eq!(engine.count("detach_database"), 1);
    assert_eq!(engine.count("attach_database"), 2);
    assert_eq!(engine.count("create_instance"), 1);

    session.close().unwrap();
    assert_eq!(engine.count("term_instance"), 1);
}

/// Records how many detaches the engine had seen whenever a tool runs.
struct DetachWatcher<'a> {
    engine: &'a FakeEngine,
    seen: RefCell<Vec<usize>>,
}

impl RepairTool for DetachWatcher<'_> {
    fn recover(&self, _: &str, _: &Path) -> DbResult<()> {
        self.seen.borrow_mut().push(self.engine.count("detach_database"));
        Ok(())
    }

    fn repair(&self, _: &Path) -> DbResult<()> {
        self.seen.borrow_mut().push(self.engine.count("detach_database"));
        Ok(())
    }
}

#[test]
fn test_failed_open_detaches_before_recovery() {
    let engine = FakeEngine::new().fail("open_database", 2);
    let repair = DetachWatcher {
        engine: &engine,
        seen: RefCell::new(Vec::new()),
    };
    let file = TestFile::new();

    let session = Session::open(&engine, &repair, file.path(), &consenting()).unwrap();
    assert_eq!(session.tier(), OpenTier::AfterRepair);
    assert_eq!(*repair.seen.borrow(), [1, 2]);

    let calls = engine.calls();
    let attempts: Vec<_> = calls
        .iter()
        .filter(|c| c.ends_with("_database"))
        .map(String::as_str)
        .collect();
    assert_eq!(
        attempts,
        [
            "attach_database",
            "open_database",
            "detach_database",
            "attach_database",
            "open_database",
            "detach_database",
            "attach_database",
            "open_database",
        ]
    );
    session.close().unwrap();
}

#[test]
fn test_open_after_repair() {
    let engine = FakeEngine::new().fail("attach_database", 2);
    let repair = FakeRepair::default();
    let file = TestFile::new();
    let options = SessionOptions {
        log_prefix: "V01".into(),
        ..consenting()
    };

    let session = Session::open(&engine, &repair, file.path(), &options).unwrap();
    assert_eq!(session.tier(), OpenTier::AfterRepair);
    assert_eq!(repair.calls(), ["recover:V01", "repair"]);
    assert_eq!(engine.count("detach_database"), 0);
    session.close().unwrap();
}

#[test]
fn test_open_exhausted() {
    let engine = FakeEngine::new().fail_always("open_database");
    let repair = FakeRepair::default();
    let file = TestFile::new();

    let error = Session::open(&engine, &repair, file.path(), &consenting()).unwrap_err();
    let (path, source) = match error {
        Error::OpenExhausted { path, source } => (path, source),
        other => panic!("unexpected error: {other}"),
    };
    assert_eq!(path, file.path());
    assert!(matches!(*source, Error::Engine { op: "open_database", .. }));
    assert_eq!(repair.calls(), ["recover:edb", "repair"]);
    assert_eq!(engine.count("attach_database"), 3);

    assert_eq!(engine.count("detach_database"), 3);
    assert_eq!(engine.count("end_session"), 1);
    assert_eq!(engine.count("term_instance"), 1);
    assert_eq!(engine.count("close_database"), 0);
}

#[test]
fn test_open_failure_teardown_errors_are_swallowed() {
    let engine = FakeEngine::new()
        .fail_always("attach_database")
        .fail_always("end_session")
        .fail_always("term_instance");
    let file = TestFile::new();

    let error =
        Session::open(&engine, &FakeRepair::default(), file.path(), &consenting()).unwrap_err();
    let source = match error {
        Error::OpenExhausted { source, .. } => source,
        other => panic!("unexpected error: {other}"),
    };
    assert!(matches!(*source, Error::Engine { op: "attach_database", .. }));
    assert_eq!(engine.count("end_session"), 1);
    assert_eq!(engine.count("term_instance"), 1);
}

#[test]
fn test_recovery_not_permitted() {
    let engine = FakeEngine::new().fail("open_database", 1);
    let repair = FakeRepair::default();
    let file = TestFile::new();

    let options = SessionOptions::default();
    let error = Session::open(&engine, &repair, file.path(), &options).unwrap_err();
    assert!(matches!(error, Error::RecoveryNotPermitted { .. }));
    assert!(repair.calls().is_empty());
    assert_eq!(engine.count("open_database"), 1);
    assert_eq!(engine.count("detach_database"), 1);
    assert_eq!(engine.count("term_instance"), 1);
}

#[test]
fn test_instance_failure_is_returned_as_is() {
    let engine = FakeEngine::new().fail("init_instance", 1);
    let repair = FakeRepair::default();
    let file = TestFile::new();

    let error = Session::open(&engine, &repair, file.path(), &consenting()).unwrap_err();
    assert!(matches!(error, Error::Engine { op: "init_instance", .. }));
    assert!(repair.calls().is_empty());
    assert_eq!(engine.count("begin_session"), 0);
    assert_eq!(engine.count("end_session"), 0);
    assert_eq!(engine.count("term_instance"), 1);
}

#[test]
fn test_close_runs_every_step() {
    let engine = FakeEngine::new()
        .fail_always("close_database")
        .fail_always("detach_database");
    let file = TestFile::new();

    let session =
        Session::open(&engine, &FakeRepair::default(), file.path(), &consenting()).unwrap();
    let error = session.close().unwrap_err();
    let source = match error {
        Error::Close(source) => source,
        other => panic!("unexpected error: {other}"),
    };
    assert!(matches!(*source, Error::Engine { op: "close_database", .. }));

    let calls = engine.calls();
    let teardown: Vec<_> = calls.iter().skip_while(|c| *c != "close_database").collect();
    assert_eq!(
        teardown,
        ["close_database", "detach_database", "end_session", "term_instance"]
    );
}

#[test]
fn test_drop_releases_session() {
    let engine = FakeEngine::new();
    let file = TestFile::new();

    {
        let _session =
            Session::open(&engine, &FakeRepair::default(), file.path(), &consenting()).unwrap();
        assert_eq!(engine.count("term_instance"), 0);
    }
    assert_eq!(engine.count("close_database"), 1);
    assert_eq!(engine.count("detach_database"), 1);
    assert_eq!(engine.count("end_session"), 1);
    assert_eq!(engine.count("term_instance"), 1);
}
