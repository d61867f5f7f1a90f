//! `log` backend that writes `[LEVEL] message` lines to a console sink.

use alloc::string::String;
use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::{Mutex, Once};
use x86_64::instructions::port::Port;

/// Anything that can take a finished log line.
pub trait Console: Sync {
    fn write_line(&self, line: &str);
}

/// 16550 UART on an I/O port base.
pub struct SerialPort {
    data: Port<u8>,
    int_en: Port<u8>,
    fifo_ctrl: Port<u8>,
    line_ctrl: Port<u8>,
    modem_ctrl: Port<u8>,
    line_sts: Port<u8>,
}

impl SerialPort {
    /// # Safety
    /// `base` must be the I/O base of a UART nobody else drives.
    pub const unsafe fn new(base: u16) -> SerialPort {
        SerialPort {
            data: Port::new(base),
            int_en: Port::new(base + 1),
            fifo_ctrl: Port::new(base + 2),
            line_ctrl: Port::new(base + 3),
            modem_ctrl: Port::new(base + 4),
            line_sts: Port::new(base + 5),
        }
    }

    pub fn init(&mut self) {
        unsafe {
            self.int_en.write(0x00);
            self.line_ctrl.write(0x80); // DLAB on
            self.data.write(0x03); // 38400 baud
            self.int_en.write(0x00);
            self.line_ctrl.write(0x03); // 8N1
            self.fifo_ctrl.write(0xC7);
            self.modem_ctrl.write(0x0B);
        }
    }

    fn send(&mut self, byte: u8) {
        unsafe {
            while (self.line_sts.read() & 0x20) == 0 {}
            self.data.write(byte);
        }
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.send(byte);
        }
        Ok(())
    }
}

/// A serial port shared between CPUs.
pub struct SerialConsole(Mutex<SerialPort>);

impl SerialConsole {
    pub fn new(mut port: SerialPort) -> Self {
        port.init();
        SerialConsole(Mutex::new(port))
    }
}

impl Console for SerialConsole {
    fn write_line(&self, line: &str) {
        let mut port = self.0.lock();
        let _ = port.write_str(line);
        let _ = port.write_char('\n');
    }
}

pub struct KernelLogger {
    console: Once<&'static dyn Console>,
}

static LOGGER: KernelLogger = KernelLogger { console: Once::new() };

/// Render a record the way it appears on the console.
pub fn format_record(record: &Record) -> String {
    let mut line = String::new();
    let _ = write!(line, "[{}] {}", record.level(), record.args());
    line
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(console) = self.console.get() {
            console.write_line(&format_record(record));
        }
    }

    fn flush(&self) {}
}

/// Install the kernel logger. Only the first call takes effect.
pub fn init(console: &'static dyn Console, level: LevelFilter) -> Result<(), SetLoggerError> {
    LOGGER.console.call_once(|| console);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}
