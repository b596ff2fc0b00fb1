//! io library: files on disk and streams that would block

mod common;

use common::*;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::rc::Rc;
use tide_engine::{Drain, Executor, FunctionRef, SuspendReason, Table, TableRef, Value};
use tide_stdlib::{IoFile, IoLib};

fn env_with(io: &IoLib) -> TableRef {
    let env = Table::new_ref();
    tide_stdlib::install_with_io(&env, io);
    env
}

fn memory_streams() -> (IoLib, Rc<RefCell<Vec<u8>>>) {
    let (lib, out, _) = memory_streams_with_error();
    (lib, out)
}

fn memory_streams_with_error() -> (IoLib, Rc<RefCell<Vec<u8>>>, Rc<RefCell<Vec<u8>>>) {
    let out = Rc::new(RefCell::new(Vec::new()));
    let err = Rc::new(RefCell::new(Vec::new()));
    let lib = IoLib::with_streams(
        IoFile::reader(io::empty()).standard(),
        IoFile::writer(SharedSink(out.clone())).standard(),
        IoFile::writer(SharedSink(err.clone())).standard(),
    );
    (lib, out, err)
}

/// `file[name]`, looked up through the handle metatable
fn method(file: &Value, name: &str) -> FunctionRef {
    let mt = file.metatable().expect("file handles have a metatable");
    let index = match mt.borrow().get_str("__index") {
        Value::Table(t) => t,
        other => panic!("__index is not a table: {:?}", other),
    };
    let f = index.borrow().get_str(name);
    match f {
        Value::Function(f) => f,
        other => panic!("file:{} is not a function: {:?}", name, other),
    }
}

struct SharedSink(Rc<RefCell<Vec<u8>>>);

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Accepts at most three bytes per write and blocks before every write
struct Choppy {
    sink: Rc<RefCell<Vec<u8>>>,
    calls: usize,
}

impl Write for Choppy {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.calls += 1;
        if self.calls % 2 == 1 {
            return Err(ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(3);
        self.sink.borrow_mut().extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Replays chunks; `None` reports `WouldBlock`, the end is EOF
struct Trickle {
    steps: VecDeque<Option<&'static [u8]>>,
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.steps.pop_front() {
            Some(Some(chunk)) => {
                buf[..chunk.len()].copy_from_slice(chunk);
                Ok(chunk.len())
            }
            Some(None) => Err(ErrorKind::WouldBlock.into()),
            None => Ok(0),
        }
    }
}

#[test]
fn test_write_resumes_after_would_block() {
    let sink = Rc::new(RefCell::new(Vec::new()));
    let lib = IoLib::with_streams(
        IoFile::reader(io::empty()),
        IoFile::writer(Choppy {
            sink: sink.clone(),
            calls: 0,
        }),
        IoFile::writer(io::sink()),
    );
    let env = env_with(&lib);

    let mut exec = executor();
    exec.push_call(lib_fn(&env, "io", "write"), &[Value::str("hello "), Value::str("world")])
        .unwrap();
    assert_eq!(exec.drain().unwrap(), Drain::Paused);
    assert_eq!(exec.last_suspend_reason(), Some(SuspendReason::Blocked));
    let names: Vec<&str> = exec
        .call_stack()
        .iter()
        .map(|f| f.frame().function.name())
        .collect();
    assert_eq!(names, ["write", "write"]);

    let mut drains = 1;
    while exec.drain().unwrap() == Drain::Paused {
        drains += 1;
        assert_eq!(exec.last_suspend_reason(), Some(SuspendReason::Blocked));
    }
    // four partial writes, each preceded by a refusal
    assert_eq!(drains, 4);
    assert_eq!(&*sink.borrow(), b"hello world");
    assert_eq!(exec.take_results(), vec![lib.output()]);
}

#[test]
fn test_read_keeps_partial_line_across_suspension() {
    let reader = Trickle {
        steps: VecDeque::from(vec![
            Some(&b"hel"[..]),
            None,
            Some(&b"lo\nwor"[..]),
            None,
            Some(&b"ld\n"[..]),
        ]),
    };
    let lib = IoLib::with_streams(
        IoFile::reader(reader),
        IoFile::writer(io::sink()),
        IoFile::writer(io::sink()),
    );
    let env = env_with(&lib);

    let out = run(
        &lib_fn(&env, "io", "read"),
        &[Value::str("l"), Value::str("l"), Value::str("l")],
    )
    .unwrap();
    assert_eq!(out.pauses, vec![SuspendReason::Blocked, SuspendReason::Blocked]);
    assert_eq!(
        out.results,
        vec![Value::str("hello"), Value::str("world"), Value::Nil]
    );
}

#[test]
fn test_files_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    let path = Value::from(path.to_string_lossy().into_owned());
    let (lib, _) = memory_streams();
    let env = env_with(&lib);
    let mut exec = executor();

    let out = run_on(&mut exec, &lib_fn(&env, "io", "output"), &[path.clone()]).unwrap();
    let file = out.results[0].clone();
    assert_ne!(file, lib.input());

    run_on(
        &mut exec,
        &lib_fn(&env, "io", "write"),
        &[Value::str("line one\n"), Value::Int(42), Value::str("\ntail")],
    )
    .unwrap();
    let out = run_on(&mut exec, &lib_fn(&env, "io", "close"), &[]).unwrap();
    assert_eq!(out.results, vec![Value::Bool(true)]);

    let out = run_on(&mut exec, &lib_fn(&env, "io", "type"), &[file]).unwrap();
    assert_eq!(out.results, vec![Value::str("closed file")]);

    let out = run_on(&mut exec, &lib_fn(&env, "io", "open"), &[path]).unwrap();
    let file = out.results[0].clone();
    let out = run_on(&mut exec, &lib_fn(&env, "io", "type"), &[file.clone()]).unwrap();
    assert_eq!(out.results, vec![Value::str("file")]);

    run_on(&mut exec, &lib_fn(&env, "io", "input"), &[file]).unwrap();
    let out = run_on(
        &mut exec,
        &lib_fn(&env, "io", "read"),
        &[Value::str("l"), Value::str("n"), Value::str("a")],
    )
    .unwrap();
    assert_eq!(
        out.results,
        vec![Value::str("line one"), Value::Int(42), Value::str("\ntail")]
    );
}

#[test]
fn test_open_failures() {
    let (lib, _) = memory_streams();
    let env = env_with(&lib);
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.txt").to_string_lossy().into_owned();

    let out = run(&lib_fn(&env, "io", "open"), &[Value::from(missing.clone())]).unwrap();
    assert_eq!(out.results.len(), 2);
    assert!(out.results[0].is_nil());
    assert!(out.results[1].as_str().unwrap().starts_with(&missing));

    let err = run(
        &lib_fn(&env, "io", "open"),
        &[Value::from(missing), Value::str("rw")],
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "bad argument #2 to 'open' (invalid mode)");
}

#[test]
fn test_standard_streams() {
    let (lib, sink) = memory_streams();
    let env = env_with(&lib);

    let out = run(&lib_fn(&env, "io", "write"), &[Value::str("a"), Value::Float(1.5)]).unwrap();
    assert_eq!(out.results, vec![lib.output()]);
    assert_eq!(&*sink.borrow(), b"a1.5");

    let out = run(&lib_fn(&env, "io", "close"), &[]).unwrap();
    assert_eq!(
        out.results,
        vec![Value::Nil, Value::str("cannot close standard file")]
    );

    let out = run(&lib_fn(&env, "io", "read"), &[]).unwrap();
    assert_eq!(out.results, vec![Value::Nil]);

    let err = run(&lib_fn(&env, "io", "read"), &[Value::str("x")]).unwrap_err();
    assert_eq!(err.to_string(), "bad argument #2 to 'read' (invalid format)");

    let out = run(&lib_fn(&env, "io", "type"), &[Value::Int(1)]).unwrap();
    assert_eq!(out.results, vec![Value::Nil]);
}

#[test]
fn test_handle_tostring() {
    let (lib, _) = memory_streams();
    let env = env_with(&lib);
    let out = run(&global_fn(&env, "tostring"), &[lib.output()]).unwrap();
    assert!(out.results[0].as_str().unwrap().starts_with("file (0x"));
}

#[test]
fn test_read_write_handle_methods() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.txt").to_string_lossy().into_owned();
    let (lib, _) = memory_streams();
    let env = env_with(&lib);
    let mut exec = executor();

    let open = lib_fn(&env, "io", "open");
    let out = run_on(&mut exec, &open, &[Value::from(path), Value::str("w+")]).unwrap();
    let file = out.results[0].clone();
    let call = |exec: &mut Executor, name: &str, args: &[Value]| {
        let mut full = vec![file.clone()];
        full.extend_from_slice(args);
        run_on(exec, &method(&file, name), &full).map(|out| out.results)
    };

    call(&mut exec, "write", &[Value::str("alpha\nbeta\n")]).unwrap();
    let pos = call(&mut exec, "seek", &[Value::str("set")]).unwrap();
    assert_eq!(pos, vec![Value::Int(0)]);
    let line = call(&mut exec, "read", &[]).unwrap();
    assert_eq!(line, vec![Value::str("alpha")]);

    // the write lands where the read stopped
    call(&mut exec, "write", &[Value::str("BETA")]).unwrap();
    assert_eq!(call(&mut exec, "seek", &[]).unwrap(), vec![Value::Int(10)]);
    assert_eq!(
        call(&mut exec, "seek", &[Value::str("end"), Value::Int(-1)]).unwrap(),
        vec![Value::Int(10)]
    );
    call(&mut exec, "seek", &[Value::str("set")]).unwrap();

    let iter = match &call(&mut exec, "lines", &[]).unwrap()[..] {
        [Value::Function(f)] => f.clone(),
        other => panic!("lines returned {:?}", other),
    };
    let mut lines = Vec::new();
    loop {
        let out = run_on(&mut exec, &iter, &[]).unwrap();
        if out.results[0].is_nil() {
            break;
        }
        lines.push(out.results[0].clone());
    }
    assert_eq!(lines, vec![Value::str("alpha"), Value::str("BETA")]);

    assert_eq!(call(&mut exec, "setvbuf", &[Value::str("no")]).unwrap(), vec![Value::Bool(true)]);
    let err = call(&mut exec, "setvbuf", &[Value::str("sometimes")]).unwrap_err();
    assert_eq!(err.to_string(), "bad argument #2 to 'setvbuf' (invalid option 'sometimes')");
    let err = call(&mut exec, "seek", &[Value::str("set"), Value::Int(-1)]).unwrap_err();
    assert_eq!(err.to_string(), "bad argument #3 to 'seek' (offset out of range)");

    assert_eq!(call(&mut exec, "close", &[]).unwrap(), vec![Value::Bool(true)]);
    let err = run_on(&mut exec, &iter, &[]).unwrap_err();
    assert_eq!(err.to_string(), "file is already closed");
}

#[test]
fn test_lines_reads_formats_per_call() {
    let reader = Trickle {
        steps: VecDeque::from(vec![Some(&b"1 2\n"[..]), None, Some(&b"3 4\n"[..])]),
    };
    let lib = IoLib::with_streams(
        IoFile::reader(reader),
        IoFile::writer(io::sink()),
        IoFile::writer(io::sink()),
    );
    let mut exec = executor();
    let stdin = lib.input();
    let out = run_on(
        &mut exec,
        &method(&stdin, "lines"),
        &[stdin.clone(), Value::str("n"), Value::str("n")],
    )
    .unwrap();
    let iter = match &out.results[..] {
        [Value::Function(f)] => f.clone(),
        other => panic!("lines returned {:?}", other),
    };

    let out = run_on(&mut exec, &iter, &[]).unwrap();
    assert!(out.pauses.is_empty());
    assert_eq!(out.results, vec![Value::Int(1), Value::Int(2)]);
    let out = run_on(&mut exec, &iter, &[]).unwrap();
    assert_eq!(out.pauses, vec![SuspendReason::Blocked]);
    assert_eq!(out.results, vec![Value::Int(3), Value::Int(4)]);
    let out = run_on(&mut exec, &iter, &[]).unwrap();
    assert_eq!(out.results, vec![Value::Nil]);
}

#[test]
fn test_seek_flushes_pending_writes_across_would_block() {
    let sink = Rc::new(RefCell::new(Vec::new()));
    let lib = IoLib::with_streams(
        IoFile::reader(io::empty()),
        IoFile::writer(Choppy {
            sink: sink.clone(),
            calls: 0,
        }),
        IoFile::writer(io::sink()),
    );
    let mut exec = executor();
    let stdout = lib.output();

    let setvbuf = method(&stdout, "setvbuf");
    let out = run_on(&mut exec, &setvbuf, &[stdout.clone(), Value::str("full")]).unwrap();
    assert_eq!(out.results, vec![Value::Bool(true)]);
    let write = method(&stdout, "write");
    let out = run_on(&mut exec, &write, &[stdout.clone(), Value::str("hello")]).unwrap();
    assert!(out.pauses.is_empty());
    assert!(sink.borrow().is_empty());

    // streams cannot seek, but the pending bytes still go out first
    let out = run_on(&mut exec, &method(&stdout, "seek"), &[stdout.clone()]).unwrap();
    assert_eq!(out.pauses, vec![SuspendReason::Blocked, SuspendReason::Blocked]);
    assert_eq!(&*sink.borrow(), b"hello");
    assert_eq!(out.results, vec![Value::Nil, Value::str("cannot seek on a stream")]);
}

#[test]
fn test_stderr_handle() {
    let (lib, out, err) = memory_streams_with_error();
    let env = env_with(&lib);
    let io_table = match env.borrow().get_str("io") {
        Value::Table(t) => t,
        other => panic!("io is not a table: {:?}", other),
    };
    let stderr = io_table.borrow().get_str("stderr");

    let result = run(&method(&stderr, "write"), &[stderr.clone(), Value::str("oops\n")]).unwrap();
    assert_eq!(result.results, vec![stderr.clone()]);
    assert_eq!(&*err.borrow(), b"oops\n");
    assert!(out.borrow().is_empty());

    let closed = run(&method(&stderr, "close"), &[stderr]).unwrap();
    assert_eq!(
        closed.results,
        vec![Value::Nil, Value::str("cannot close standard file")]
    );
}
