//! I/O library
//!
//! File handles are userdata wrapping an [`IoFile`]. A handle operation
//! that hits `ErrorKind::WouldBlock` suspends with reason `Blocked` and
//! picks up where it stopped once resumed: a write keeps its offset into
//! the pending bytes, a read keeps the results produced so far and any
//! partially read line.
//!
//! A disk file is one OS handle for both directions. Pending writes are
//! flushed before the next read, and read-ahead is given back with a seek
//! before the next write, so each direction sees the other's effects.
//!
//! `io.write`, `io.read`, `io.flush` and `io.close` forward to the handle
//! methods through `dispatch::call` on their own window, so resuming them
//! is a pass-through.

use crate::args::Args;
use std::cell::RefCell;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::mem;
use std::rc::Rc;
use tide_engine::value::parse_number;
use tide_engine::{
    dispatch, restore, CallFrame, CallResult, ExecError, ExecutionContext, Function, FunctionRef,
    NativeFunction, SavedState, ScriptError, Table, TableRef, Userdata, UserdataRef, Value,
};

/// Bytes pulled from a reader per fill, and the default write buffer size
const BUFFER_SIZE: usize = 4096;

/// Longest numeral `read("n")` accepts
const MAX_NUMERAL: usize = 200;

// ============================================================================
// File handles
// ============================================================================

fn not_open(direction: &str) -> io::Error {
    io::Error::new(ErrorKind::Unsupported, format!("file not open for {}", direction))
}

/// Where a handle's bytes come from and go to
enum Channel {
    /// Host streams; either direction may be missing
    Streams {
        reader: Option<Box<dyn Read>>,
        writer: Option<Box<dyn Write>>,
    },
    /// A file on disk; reads and writes move one shared cursor
    Disk {
        file: File,
        readable: bool,
        writable: bool,
    },
}

impl Channel {
    fn closed() -> Self {
        Channel::Streams {
            reader: None,
            writer: None,
        }
    }

    fn readable(&self) -> bool {
        match self {
            Channel::Streams { reader, .. } => reader.is_some(),
            Channel::Disk { readable, .. } => *readable,
        }
    }

    fn writable(&self) -> bool {
        match self {
            Channel::Streams { writer, .. } => writer.is_some(),
            Channel::Disk { writable, .. } => *writable,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Channel::Streams {
                reader: Some(reader),
                ..
            } => reader.read(buf),
            Channel::Disk {
                file,
                readable: true,
                ..
            } => file.read(buf),
            _ => Err(not_open("reading")),
        }
    }

    /// Write part of `buf`, retrying interrupts; no progress is an error
    fn write_some(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            let written = match self {
                Channel::Streams {
                    writer: Some(writer),
                    ..
                } => writer.write(buf),
                Channel::Disk {
                    file,
                    writable: true,
                    ..
                } => file.write(buf),
                _ => return Err(not_open("writing")),
            };
            match written {
                Ok(0) => {
                    return Err(io::Error::new(ErrorKind::WriteZero, "failed to write whole buffer"))
                }
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Channel::Streams {
                writer: Some(writer),
                ..
            } => writer.flush(),
            Channel::Disk { file, .. } => file.flush(),
            _ => Ok(()),
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Channel::Disk { file, .. } => file.seek(pos),
            Channel::Streams { .. } => {
                Err(io::Error::new(ErrorKind::Unsupported, "cannot seek on a stream"))
            }
        }
    }
}

/// Write buffering of a handle, as set by `file:setvbuf`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Buffering {
    /// Every write goes straight to the channel
    No,
    /// Flushed once `n` bytes are pending
    Full(usize),
    /// Flushed at a newline or once `n` bytes are pending
    Line(usize),
}

impl Buffering {
    fn parse(mode: &str, size: usize) -> Option<Buffering> {
        match mode {
            "no" => Some(Buffering::No),
            "full" => Some(Buffering::Full(size)),
            "line" => Some(Buffering::Line(size)),
            _ => None,
        }
    }
}

/// Host side of a file handle
///
/// Host streams are unbuffered on the write side by default, since the
/// writer usually buffers on its own. Disk files are fully buffered.
pub struct IoFile {
    channel: Channel,
    /// Bytes read ahead of the script's position
    buffer: Vec<u8>,
    /// Bytes written by the script but not yet given to the channel
    pending: Vec<u8>,
    buffering: Buffering,
    closed: bool,
    standard: bool,
}

impl IoFile {
    fn with_channel(channel: Channel, buffering: Buffering) -> Self {
        Self {
            channel,
            buffer: Vec::new(),
            pending: Vec::new(),
            buffering,
            closed: false,
            standard: false,
        }
    }

    /// Create a handle from an optional reader and writer
    pub fn new(reader: Option<Box<dyn Read>>, writer: Option<Box<dyn Write>>) -> Self {
        Self::with_channel(Channel::Streams { reader, writer }, Buffering::No)
    }

    /// Read-only handle
    pub fn reader(reader: impl Read + 'static) -> Self {
        Self::new(Some(Box::new(reader)), None)
    }

    /// Write-only handle
    pub fn writer(writer: impl Write + 'static) -> Self {
        Self::new(None, Some(Box::new(writer)))
    }

    /// Seekable handle on an open file, used in the given directions
    pub fn disk(file: File, readable: bool, writable: bool) -> Self {
        let channel = Channel::Disk {
            file,
            readable,
            writable,
        };
        Self::with_channel(channel, Buffering::Full(BUFFER_SIZE))
    }

    /// Mark as a standard stream, which scripts may not close
    pub fn standard(mut self) -> Self {
        self.standard = true;
        self
    }

    /// Check if the handle has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn fill(&mut self) -> io::Result<usize> {
        // pending writes must land before the cursor moves on
        self.flush_pending()?;
        let mut chunk = [0u8; BUFFER_SIZE];
        loop {
            match self.channel.read(&mut chunk) {
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn read_line(&mut self, keep_newline: bool, partial: &mut Vec<u8>) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(i) = self.buffer.iter().position(|&b| b == b'\n') {
                partial.extend(self.buffer.drain(..=i));
                let mut line = mem::take(partial);
                if !keep_newline {
                    line.pop();
                }
                return Ok(Some(line));
            }
            partial.append(&mut self.buffer);
            if self.fill()? == 0 {
                return Ok((!partial.is_empty()).then(|| mem::take(partial)));
            }
        }
    }

    fn read_all(&mut self, partial: &mut Vec<u8>) -> io::Result<Vec<u8>> {
        loop {
            partial.append(&mut self.buffer);
            if self.fill()? == 0 {
                return Ok(mem::take(partial));
            }
        }
    }

    fn read_count(&mut self, count: usize, partial: &mut Vec<u8>) -> io::Result<Option<Vec<u8>>> {
        if count == 0 {
            let at_end = self.buffer.is_empty() && self.fill()? == 0;
            return Ok((!at_end).then(Vec::new));
        }
        loop {
            let take = (count - partial.len()).min(self.buffer.len());
            partial.extend(self.buffer.drain(..take));
            if partial.len() == count {
                return Ok(Some(mem::take(partial)));
            }
            if self.fill()? == 0 {
                return Ok((!partial.is_empty()).then(|| mem::take(partial)));
            }
        }
    }

    fn read_number(&mut self, partial: &mut Vec<u8>) -> io::Result<Value> {
        loop {
            let mut consumed = 0;
            let mut finished = false;
            for &b in &self.buffer {
                if partial.is_empty() && b.is_ascii_whitespace() {
                    consumed += 1;
                } else if is_numeral_byte(b) && partial.len() < MAX_NUMERAL {
                    partial.push(b);
                    consumed += 1;
                } else {
                    finished = true;
                    break;
                }
            }
            self.buffer.drain(..consumed);
            if finished || self.fill()? == 0 {
                let text = mem::take(partial);
                return Ok(std::str::from_utf8(&text)
                    .ok()
                    .and_then(parse_number)
                    .unwrap_or_default());
            }
        }
    }

    fn read_format(&mut self, format: ReadFormat, partial: &mut Vec<u8>) -> io::Result<Value> {
        let bytes = match format {
            ReadFormat::Line { keep_newline } => self.read_line(keep_newline, partial)?,
            ReadFormat::All => Some(self.read_all(partial)?),
            ReadFormat::Count(n) => self.read_count(n, partial)?,
            ReadFormat::Number => return self.read_number(partial),
        };
        Ok(bytes
            .map(|b| Value::from(String::from_utf8_lossy(&b).into_owned()))
            .unwrap_or_default())
    }

    /// Hand `pending` to the channel; bytes leave `pending` as they are accepted
    fn flush_pending(&mut self) -> io::Result<()> {
        while !self.pending.is_empty() {
            let n = self.channel.write_some(&self.pending)?;
            self.pending.drain(..n);
        }
        Ok(())
    }

    /// Move a disk file's cursor back over the read-ahead
    fn discard_read_ahead(&mut self) -> io::Result<()> {
        if let Channel::Disk { file, .. } = &mut self.channel {
            if !self.buffer.is_empty() {
                file.seek(SeekFrom::Current(-(self.buffer.len() as i64)))?;
                self.buffer.clear();
            }
        }
        Ok(())
    }

    /// Write `data[*offset..]`, advancing `offset` as bytes are accepted
    fn write_from(&mut self, data: &[u8], offset: &mut usize) -> io::Result<()> {
        if !self.channel.writable() {
            return Err(not_open("writing"));
        }
        self.discard_read_ahead()?;
        let limit = match self.buffering {
            Buffering::No => {
                self.flush_pending()?;
                while *offset < data.len() {
                    *offset += self.channel.write_some(&data[*offset..])?;
                }
                return Ok(());
            }
            Buffering::Full(limit) | Buffering::Line(limit) => limit,
        };
        self.pending.extend_from_slice(&data[*offset..]);
        *offset = data.len();
        let line_done = matches!(self.buffering, Buffering::Line(_)) && self.pending.contains(&b'\n');
        if line_done || self.pending.len() >= limit {
            self.flush_pending()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_pending()?;
        self.channel.flush()
    }

    /// Reposition a disk file; the result is the new offset from the start
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.flush_pending()?;
        let pos = match pos {
            SeekFrom::Current(delta) => {
                let delta = delta
                    .checked_sub(self.buffer.len() as i64)
                    .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "offset out of range"))?;
                SeekFrom::Current(delta)
            }
            other => other,
        };
        let at = self.channel.seek(pos)?;
        self.buffer.clear();
        Ok(at)
    }

    fn set_buffering(&mut self, buffering: Buffering) -> io::Result<()> {
        self.flush_pending()?;
        self.buffering = buffering;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.flush()?;
        self.channel = Channel::closed();
        self.buffer.clear();
        self.closed = true;
        Ok(())
    }
}

impl Drop for IoFile {
    fn drop(&mut self) {
        // errors are dropped, as `BufWriter` does
        let _ = self.flush_pending();
    }
}

impl fmt::Debug for IoFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoFile")
            .field("readable", &self.channel.readable())
            .field("writable", &self.channel.writable())
            .field("buffered", &self.buffer.len())
            .field("pending", &self.pending.len())
            .field("buffering", &self.buffering)
            .field("closed", &self.closed)
            .finish()
    }
}

fn is_numeral_byte(b: u8) -> bool {
    b.is_ascii_hexdigit() || matches!(b, b'.' | b'+' | b'-' | b'x' | b'X' | b'p' | b'P')
}

fn io_failure(e: io::Error) -> ScriptError {
    ScriptError::new(e.to_string())
}

/// Take the handle argument, rejecting anything that is not an open file
fn check_file(args: &mut Args) -> Result<UserdataRef, ScriptError> {
    match args.next_opt() {
        Value::Userdata(u) if u.is::<IoFile>() => {
            if u.with(|f: &IoFile| f.closed).unwrap_or(true) {
                return Err(ScriptError::new("attempt to use a closed file"));
            }
            Ok(u)
        }
        other => Err(args.bad_argument_at(1, format!("FILE* expected, got {}", other.type_name()))),
    }
}

fn with_file<R>(file: &UserdataRef, f: impl FnOnce(&mut IoFile) -> R) -> Result<R, ScriptError> {
    file.with_mut(f)
        .ok_or_else(|| ScriptError::new("FILE* expected"))
}

// ============================================================================
// Handle methods
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadFormat {
    Line { keep_newline: bool },
    All,
    Number,
    Count(usize),
}

impl ReadFormat {
    fn parse(value: &Value) -> Option<ReadFormat> {
        match value {
            Value::Str(s) => match s.trim_start_matches('*').chars().next()? {
                'l' => Some(ReadFormat::Line { keep_newline: false }),
                'L' => Some(ReadFormat::Line { keep_newline: true }),
                'a' => Some(ReadFormat::All),
                'n' => Some(ReadFormat::Number),
                _ => None,
            },
            Value::Int(_) | Value::Float(_) => value
                .as_int()
                .and_then(|n| usize::try_from(n).ok())
                .map(ReadFormat::Count),
            _ => None,
        }
    }
}

/// `file:write(...)`
#[derive(Debug, Default)]
struct FileWrite;

struct WriteState {
    file: UserdataRef,
    data: Vec<u8>,
    offset: usize,
}

impl FileWrite {
    fn run(&self, ctx: &mut ExecutionContext, frame: &CallFrame, mut st: WriteState) -> CallResult {
        match with_file(&st.file, |f| f.write_from(&st.data, &mut st.offset))? {
            Ok(()) => {
                frame.base.ret(&mut ctx.stack, &[Value::Userdata(st.file)])?;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(ctx.block().resolve(frame, st)),
            Err(e) => Err(io_failure(e).into()),
        }
    }
}

impl Function for FileWrite {
    fn name(&self) -> &str {
        "write"
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        let mut args = Args::from_frame("write", ctx, frame);
        let file = check_file(&mut args)?;
        let mut data = Vec::new();
        while args.has_next() {
            let s = args.next_string()?;
            data.extend_from_slice(s.as_bytes());
        }
        self.run(ctx, frame, WriteState { file, data, offset: 0 })
    }

    fn resume(&self, ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState) -> CallResult {
        let state: WriteState = restore(state, frame)?;
        self.run(ctx, frame, state)
    }
}

/// Format arguments of `read` and `lines`; none means one line
fn parse_formats(args: &mut Args) -> Result<Vec<ReadFormat>, ScriptError> {
    let mut formats = Vec::new();
    while args.has_next() {
        let index = args.position();
        let value = args.next_opt();
        let format =
            ReadFormat::parse(&value).ok_or_else(|| args.bad_argument_at(index, "invalid format"))?;
        formats.push(format);
    }
    if formats.is_empty() {
        formats.push(ReadFormat::Line { keep_newline: false });
    }
    Ok(formats)
}

struct ReadState {
    file: UserdataRef,
    formats: Vec<ReadFormat>,
    results: Vec<Value>,
    partial: Vec<u8>,
}

impl ReadState {
    fn new(file: UserdataRef, formats: Vec<ReadFormat>) -> Self {
        Self {
            file,
            formats,
            results: Vec::new(),
            partial: Vec::new(),
        }
    }
}

/// Read every format in turn, stopping at the first that finds nothing
fn read_formats(ctx: &mut ExecutionContext, frame: &CallFrame, mut st: ReadState) -> CallResult {
    while st.results.len() < st.formats.len() {
        let format = st.formats[st.results.len()];
        match with_file(&st.file, |f| f.read_format(format, &mut st.partial))? {
            Ok(value) => {
                let at_end = value.is_nil();
                st.results.push(value);
                if at_end {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                return Err(ctx.block().resolve(frame, st));
            }
            Err(e) => return Err(io_failure(e).into()),
        }
    }
    frame.base.ret(&mut ctx.stack, &st.results)?;
    Ok(())
}

/// `file:read(...)`
#[derive(Debug, Default)]
struct FileRead;

impl Function for FileRead {
    fn name(&self) -> &str {
        "read"
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        let mut args = Args::from_frame("read", ctx, frame);
        let file = check_file(&mut args)?;
        let formats = parse_formats(&mut args)?;
        read_formats(ctx, frame, ReadState::new(file, formats))
    }

    fn resume(&self, ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState) -> CallResult {
        let state: ReadState = restore(state, frame)?;
        read_formats(ctx, frame, state)
    }
}

/// `file:lines(...)`
fn file_lines(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, ExecError> {
    let mut args = Args::new("lines", args);
    let file = check_file(&mut args)?;
    let formats = parse_formats(&mut args)?;
    let iter: FunctionRef = Rc::new(LinesIter { file, formats });
    Ok(vec![Value::Function(iter)])
}

/// Iterator returned by `file:lines`; each call reads the same formats
#[derive(Debug)]
struct LinesIter {
    file: UserdataRef,
    formats: Vec<ReadFormat>,
}

impl Function for LinesIter {
    fn name(&self) -> &str {
        "lines_iterator"
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        if self.file.with(|f: &IoFile| f.closed).unwrap_or(true) {
            return Err(ScriptError::new("file is already closed").into());
        }
        let state = ReadState::new(self.file.clone(), self.formats.clone());
        read_formats(ctx, frame, state)
    }

    fn resume(&self, ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState) -> CallResult {
        let state: ReadState = restore(state, frame)?;
        read_formats(ctx, frame, state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Seek(SeekFrom),
    Setvbuf(Buffering),
}

struct ControlState {
    file: UserdataRef,
    control: Control,
}

/// `file:seek([whence [, offset]])` and `file:setvbuf(mode [, size])`
///
/// Both flush pending writes first, so both may block. Failures other than
/// blocking are reported as `nil, message`.
#[derive(Debug)]
struct FileControl {
    seek: bool,
}

impl FileControl {
    fn run(&self, ctx: &mut ExecutionContext, frame: &CallFrame, st: ControlState) -> CallResult {
        let control = st.control;
        let outcome = with_file(&st.file, |f| match control {
            Control::Seek(pos) => f
                .seek(pos)
                .map(|at| Value::Int(i64::try_from(at).unwrap_or(i64::MAX))),
            Control::Setvbuf(buffering) => f.set_buffering(buffering).map(|()| Value::Bool(true)),
        })?;
        let results = match outcome {
            Ok(value) => vec![value],
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Err(ctx.block().resolve(frame, st)),
            Err(e) => vec![Value::Nil, Value::from(e.to_string())],
        };
        frame.base.ret(&mut ctx.stack, &results)?;
        Ok(())
    }

    fn parse(&self, args: &mut Args) -> Result<Control, ScriptError> {
        if self.seek {
            let whence = args.opt_string()?;
            let offset = args.opt_int(0)?;
            let pos = match whence.as_deref().unwrap_or("cur") {
                "set" => SeekFrom::Start(
                    u64::try_from(offset).map_err(|_| args.bad_argument_at(3, "offset out of range"))?,
                ),
                "cur" => SeekFrom::Current(offset),
                "end" => SeekFrom::End(offset),
                other => return Err(args.bad_argument_at(2, format!("invalid option '{}'", other))),
            };
            Ok(Control::Seek(pos))
        } else {
            let mode = args.next_string()?;
            let size = args.opt_int(BUFFER_SIZE as i64)?;
            let size = usize::try_from(size).map_err(|_| args.bad_argument_at(3, "invalid buffer size"))?;
            Buffering::parse(&mode, size)
                .map(Control::Setvbuf)
                .ok_or_else(|| args.bad_argument_at(2, format!("invalid option '{}'", mode)))
        }
    }
}

impl Function for FileControl {
    fn name(&self) -> &str {
        if self.seek {
            "seek"
        } else {
            "setvbuf"
        }
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        let mut args = Args::new(
            if self.seek { "seek" } else { "setvbuf" },
            frame.base.values(&ctx.stack).to_vec(),
        );
        let file = check_file(&mut args)?;
        let control = self.parse(&mut args)?;
        self.run(ctx, frame, ControlState { file, control })
    }

    fn resume(&self, ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState) -> CallResult {
        let state: ControlState = restore(state, frame)?;
        self.run(ctx, frame, state)
    }
}

/// `file:flush()` and `file:close()`
#[derive(Debug)]
struct FileFinish {
    close: bool,
}

impl FileFinish {
    fn run(&self, ctx: &mut ExecutionContext, frame: &CallFrame, file: UserdataRef) -> CallResult {
        let outcome = with_file(&file, |f| if self.close { f.close() } else { f.flush() })?;
        match outcome {
            Ok(()) => {
                let result = if self.close {
                    Value::Bool(true)
                } else {
                    Value::Userdata(file)
                };
                frame.base.ret(&mut ctx.stack, &[result])?;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(ctx.block().resolve(frame, file)),
            Err(e) => Err(io_failure(e).into()),
        }
    }
}

impl Function for FileFinish {
    fn name(&self) -> &str {
        if self.close {
            "close"
        } else {
            "flush"
        }
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        let mut args = Args::new(
            if self.close { "close" } else { "flush" },
            frame.base.values(&ctx.stack).to_vec(),
        );
        let file = check_file(&mut args)?;
        if self.close && file.with(|f: &IoFile| f.standard).unwrap_or(false) {
            frame
                .base
                .ret(&mut ctx.stack, &[Value::Nil, Value::str("cannot close standard file")])?;
            return Ok(());
        }
        self.run(ctx, frame, file)
    }

    fn resume(&self, ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState) -> CallResult {
        let file: UserdataRef = restore(state, frame)?;
        self.run(ctx, frame, file)
    }
}

fn file_tostring(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, ExecError> {
    let text = match args.first() {
        Some(Value::Userdata(u)) => match u.with(|f: &IoFile| f.closed) {
            Some(true) => "file (closed)".to_string(),
            Some(false) => format!("file ({:p})", Rc::as_ptr(u)),
            None => dispatch::default_tostring(&Value::Userdata(u.clone())),
        },
        _ => return Err(ScriptError::bad_argument(1, "tostring", "FILE* expected").into()),
    };
    Ok(vec![Value::from(text)])
}

// ============================================================================
// Library
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Input,
    Output,
}

struct Shared {
    metatable: TableRef,
    methods: [(&'static str, FunctionRef); 7],
    input: RefCell<Value>,
    output: RefCell<Value>,
    error: Value,
}

impl Shared {
    fn method(&self, name: &str) -> Option<FunctionRef> {
        self.methods
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| f.clone())
    }

    fn slot(&self, stream: Stream) -> &RefCell<Value> {
        match stream {
            Stream::Input => &self.input,
            Stream::Output => &self.output,
        }
    }
}

/// The `io` library with its standard and default handles
#[derive(Clone)]
pub struct IoLib {
    shared: Rc<Shared>,
}

impl IoLib {
    /// Library bound to the process's standard streams
    pub fn new() -> Self {
        Self::with_streams(
            IoFile::reader(io::stdin()).standard(),
            IoFile::writer(io::stdout()).standard(),
            IoFile::writer(io::stderr()).standard(),
        )
    }

    /// Library on the given `stdin`, `stdout` and `stderr`.
    ///
    /// The first two also start out as the default input and output.
    pub fn with_streams(input: IoFile, output: IoFile, error: IoFile) -> Self {
        let methods: [(&'static str, FunctionRef); 7] = [
            ("write", Rc::new(FileWrite)),
            ("read", Rc::new(FileRead)),
            ("flush", Rc::new(FileFinish { close: false })),
            ("close", Rc::new(FileFinish { close: true })),
            ("lines", NativeFunction::new("lines", file_lines)),
            ("seek", Rc::new(FileControl { seek: true })),
            ("setvbuf", Rc::new(FileControl { seek: false })),
        ];
        let index = Table::new_ref();
        for (name, f) in &methods {
            index.borrow_mut().set_str(name, f.clone());
        }
        let metatable = Table::new_ref();
        {
            let mut mt = metatable.borrow_mut();
            mt.set_str("__index", index);
            mt.set_str("__name", "FILE*");
            mt.set_str("__tostring", NativeFunction::new("tostring", file_tostring));
        }

        let input = Value::Userdata(Userdata::new(input, Some(metatable.clone())));
        let output = Value::Userdata(Userdata::new(output, Some(metatable.clone())));
        let error = Value::Userdata(Userdata::new(error, Some(metatable.clone())));
        Self {
            shared: Rc::new(Shared {
                metatable,
                methods,
                input: RefCell::new(input),
                output: RefCell::new(output),
                error,
            }),
        }
    }

    /// Expose a host file handle to scripts
    pub fn wrap(&self, file: IoFile) -> Value {
        Value::Userdata(Userdata::new(file, Some(self.shared.metatable.clone())))
    }

    /// Current default input handle
    pub fn input(&self) -> Value {
        self.shared.input.borrow().clone()
    }

    /// Current default output handle
    pub fn output(&self) -> Value {
        self.shared.output.borrow().clone()
    }

    /// Build the `io` table
    pub fn library(&self) -> TableRef {
        let lib = Table::new_ref();
        {
            let mut t = lib.borrow_mut();
            for (name, stream, explicit_file) in [
                ("write", Stream::Output, false),
                ("read", Stream::Input, false),
                ("flush", Stream::Output, false),
                ("close", Stream::Output, true),
            ] {
                if let Some(method) = self.shared.method(name) {
                    let delegate: FunctionRef = Rc::new(Delegate {
                        name,
                        method,
                        stream,
                        explicit_file,
                        shared: self.shared.clone(),
                    });
                    t.set_str(name, delegate);
                }
            }

            let lib = self.clone();
            t.set_str(
                "open",
                NativeFunction::new("open", move |_, args| lib.open(args)),
            );
            let lib = self.clone();
            t.set_str(
                "input",
                NativeFunction::new("input", move |_, args| lib.select(Stream::Input, args)),
            );
            let lib = self.clone();
            t.set_str(
                "output",
                NativeFunction::new("output", move |_, args| lib.select(Stream::Output, args)),
            );
            t.set_str("type", NativeFunction::new("type", io_type));
            t.set_str("stdin", self.input());
            t.set_str("stdout", self.output());
            t.set_str("stderr", self.shared.error.clone());
        }
        lib
    }

    /// Install the `io` table into `env`
    pub fn install(&self, env: &TableRef) {
        env.borrow_mut().set_str("io", self.library());
    }

    fn open(&self, args: Vec<Value>) -> Result<Vec<Value>, ExecError> {
        let mut args = Args::new("open", args);
        let name = args.next_string()?;
        let mode = args.opt_string()?.unwrap_or_else(|| Rc::from("r"));
        let options = OpenMode::parse(&mode).ok_or_else(|| args.bad_argument_at(2, "invalid mode"))?;
        Ok(match options.open(&name) {
            Ok(file) => vec![self.wrap(file)],
            Err(e) => vec![Value::Nil, Value::from(format!("{}: {}", name, e))],
        })
    }

    fn select(&self, stream: Stream, args: Vec<Value>) -> Result<Vec<Value>, ExecError> {
        let function = match stream {
            Stream::Input => "input",
            Stream::Output => "output",
        };
        let mut args = Args::new(function, args);
        let slot = self.shared.slot(stream);
        match args.next_opt() {
            Value::Nil => {}
            Value::Userdata(u) if u.is::<IoFile>() => *slot.borrow_mut() = Value::Userdata(u),
            other => {
                let name = other.to_str_coerced().ok_or_else(|| {
                    args.bad_argument_at(1, format!("FILE* expected, got {}", other.type_name()))
                })?;
                let mode = match stream {
                    Stream::Input => OpenMode::READ,
                    Stream::Output => OpenMode::WRITE,
                };
                let file = mode
                    .open(&name)
                    .map_err(|e| ScriptError::new(format!("{}: {}", name, e)))?;
                *slot.borrow_mut() = self.wrap(file);
            }
        }
        let current = slot.borrow().clone();
        Ok(vec![current])
    }
}

impl Default for IoLib {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IoLib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoLib")
            .field("input", &self.shared.input.borrow())
            .field("output", &self.shared.output.borrow())
            .finish()
    }
}

fn io_type(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, ExecError> {
    let mut args = Args::new("type", args);
    let value = args.next_any()?;
    let kind = match &value {
        Value::Userdata(u) => u.with(|f: &IoFile| if f.closed { "closed file" } else { "file" }),
        _ => None,
    };
    Ok(vec![kind.map(Value::str).unwrap_or_default()])
}

/// `io.write` and friends: call the handle method on the default stream
struct Delegate {
    name: &'static str,
    method: FunctionRef,
    stream: Stream,
    explicit_file: bool,
    shared: Rc<Shared>,
}

impl fmt::Debug for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Delegate(io.{})", self.name)
    }
}

impl Function for Delegate {
    fn name(&self) -> &str {
        self.name
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        let args = frame.base.values(&ctx.stack).to_vec();
        let has_file = self.explicit_file
            && matches!(args.first(), Some(Value::Userdata(u)) if u.is::<IoFile>());
        if !has_file {
            let default = self.shared.slot(self.stream).borrow().clone();
            frame.base.set_top(&mut ctx.stack, 0)?;
            frame.base.push(&mut ctx.stack, default)?;
            frame.base.push_all(&mut ctx.stack, &args)?;
        }
        match dispatch::call(ctx, &self.method, frame.base) {
            Ok(()) => Ok(()),
            Err(raise) => Err(raise.resolve(frame, ())),
        }
    }

    fn resume(&self, _ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState) -> CallResult {
        restore::<()>(state, frame)?;
        Ok(())
    }
}

/// How `io.open` opens a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenMode {
    read: bool,
    write: bool,
    append: bool,
    truncate: bool,
    create: bool,
}

impl OpenMode {
    const READ: OpenMode = OpenMode {
        read: true,
        write: false,
        append: false,
        truncate: false,
        create: false,
    };

    const WRITE: OpenMode = OpenMode {
        read: false,
        write: true,
        append: false,
        truncate: true,
        create: true,
    };

    fn parse(mode: &str) -> Option<OpenMode> {
        let base = mode.strip_suffix('b').unwrap_or(mode);
        let append = OpenMode {
            write: false,
            append: true,
            truncate: false,
            ..OpenMode::WRITE
        };
        match base {
            "r" => Some(OpenMode::READ),
            "w" => Some(OpenMode::WRITE),
            "a" => Some(append),
            "r+" => Some(OpenMode {
                write: true,
                ..OpenMode::READ
            }),
            "w+" => Some(OpenMode {
                read: true,
                ..OpenMode::WRITE
            }),
            "a+" => Some(OpenMode { read: true, ..append }),
            _ => None,
        }
    }

    fn open(self, path: &str) -> io::Result<IoFile> {
        let file = OpenOptions::new()
            .read(self.read)
            .write(self.write)
            .append(self.append)
            .truncate(self.truncate)
            .create(self.create)
            .open(path)?;
        Ok(IoFile::disk(file, self.read, self.write || self.append))
    }
}
