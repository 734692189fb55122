use std::cell::{Cell, RefCell};

use esedump::{
    dump, dump_with_consent, error::Error, process::ProcessControl, DbResult, DumpOptions,
};

mod test_utils;

use test_utils::{cell, FakeEngine, FakeRepair, FakeTable, TestFile};

#[derive(Default)]
struct Processes {
    stopped: RefCell<Vec<String>>,
}

impl ProcessControl for Processes {
    fn stop(&self, name: &str) -> DbResult<bool> {
        self.stopped.borrow_mut().push(name.to_owned());
        if name == "locked.exe" {
            return Err(Error::Io(std::io::ErrorKind::PermissionDenied.into()));
        }
        Ok(true)
    }
}

fn fake_engine() -> FakeEngine {
    FakeEngine::new()
        .with_table(FakeTable::new("Containers").column("Id", 4, 1).row([(1, cell(1_i32))]))
        .with_table(FakeTable::new("Bad").column("Id", 4, 1).row([(1, cell(2_i32))]))
        .fail_always("retrieve:Bad")
}

#[test]
fn test_dump() {
    let engine = fake_engine();
    let processes = Processes::default();
    let file = TestFile::new();
    let options = DumpOptions {
        stop_processes: vec!["locked.exe".into(), "taskhostw.exe".into()],
        log_prefix: "V01".into(),
        ..DumpOptions::new(file.path())
    };

    let result = dump(&engine, &FakeRepair::default(), &processes, &options).unwrap();
    assert_eq!(*processes.stopped.borrow(), ["locked.exe", "taskhostw.exe"]);
    assert_eq!(result.tables.len(), 1);
    assert_eq!(result.tables[0].name, "Containers");
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].table, "Bad");

    assert_eq!(engine.count("set_param:base_name=V01"), 1);
    assert_eq!(engine.count("term_instance"), 1);
    assert_eq!(engine.open_cursors(), 0);
}

#[test]
fn test_dump_close_failure_is_not_returned() {
    let engine = fake_engine().fail_always("close_database");
    let file = TestFile::new();

    let result = dump(
        &engine,
        &FakeRepair::default(),
        &Processes::default(),
        &DumpOptions::new(file.path()),
    )
    .unwrap();
    assert_eq!(result.tables.len(), 1);
    assert_eq!(engine.count("detach_database"), 1);
    assert_eq!(engine.count("end_session"), 1);
    assert_eq!(engine.count("term_instance"), 1);
}

#[test]
fn test_dump_scan_failure_still_closes() {
    let engine = fake_engine().fail_always("table_names");
    let file = TestFile::new();

    let error = dump(
        &engine,
        &FakeRepair::default(),
        &Processes::default(),
        &DumpOptions::new(file.path()),
    )
    .unwrap_err();
    assert!(matches!(error, Error::Engine { op: "table_names", .. }));
    assert_eq!(engine.count("close_database"), 1);
    assert_eq!(engine.count("term_instance"), 1);
}

#[test]
fn test_dump_consent() {
    let file = TestFile::new();

    let engine = fake_engine().fail("open_database", 1);
    let repair = FakeRepair::default();
    let error = dump(&engine, &repair, &Processes::default(), &DumpOptions::new(file.path()))
        .unwrap_err();
    assert!(matches!(error, Error::RecoveryNotPermitted { .. }));
    assert!(error.is_open_error());
    assert!(repair.calls().is_empty());

    let engine = fake_engine().fail("open_database", 1);
    let repair = FakeRepair::default();
    let options = DumpOptions {
        consent: true,
        ..DumpOptions::new(file.path())
    };
    let result = dump(&engine, &repair, &Processes::default(), &options).unwrap();
    assert_eq!(repair.calls(), ["recover:edb"]);
    assert_eq!(result.tables.len(), 1);
}

#[test]
fn test_consent_not_asked_when_open_succeeds() {
    let engine = fake_engine();
    let file = TestFile::new();
    let asked = Cell::new(false);

    let result = dump_with_consent(
        &engine,
        &FakeRepair::default(),
        &Processes::default(),
        &DumpOptions::new(file.path()),
        || {
            asked.set(true);
            Ok(true)
        },
    )
    .unwrap();
    assert!(!asked.get());
    assert_eq!(result.tables.len(), 1);
}

#[test]
fn test_consent_asked_when_recovery_is_needed() {
    let engine = fake_engine().fail("open_database", 2);
    let repair = FakeRepair::default();
    let file = TestFile::new();

    let result = dump_with_consent(
        &engine,
        &repair,
        &Processes::default(),
        &DumpOptions::new(file.path()),
        || Ok(true),
    )
    .unwrap();
    assert_eq!(repair.calls(), ["recover:edb"]);
    assert_eq!(result.tables.len(), 1);
    assert_eq!(engine.count("term_instance"), 2);
}

#[test]
fn test_consent_refused() {
    let engine = fake_engine().fail("open_database", 2);
    let repair = FakeRepair::default();
    let file = TestFile::new();

    let error = dump_with_consent(
        &engine,
        &repair,
        &Processes::default(),
        &DumpOptions::new(file.path()),
        || Ok(false),
    )
    .unwrap_err();
    assert!(matches!(error, Error::RecoveryNotPermitted { .. }));
    assert!(repair.calls().is_empty());
    assert_eq!(engine.count("create_instance"), 1);
}
