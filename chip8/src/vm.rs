//! Virtual machine.
use log::warn;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    bytecode::*,
    clock::{Clock, Hz},
    constants::*,
    cpu::Chip8Cpu,
    devices::{InputEvent, KeyCode, Keypad},
    display::Display,
    error::{Chip8Error, Chip8Result},
    memory::Memory,
    stack::Stack,
};

/// Something that can be driven forward one batch of instructions at a time,
/// and rendered afterwards.
pub trait Steppable {
    /// Run `count` fetch, execute and timer cycles.
    fn cycle(&mut self, count: usize) -> Chip8Result<()>;

    /// Current state of the screen.
    fn display(&self) -> &Display;
}

pub struct Chip8Vm {
    cpu: Chip8Cpu,
    /// Drives the delay and sound timers in [`TimerMode::Realtime`].
    timer: Clock,
    rng: StdRng,
    conf: Chip8Conf,
}

impl Chip8Vm {
    pub fn new(conf: Chip8Conf) -> Self {
        let rng = match conf.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut vm = Chip8Vm {
            cpu: Chip8Cpu::new(),
            timer: Clock::from_hz(Hz(DELAY_FREQUENCY)),
            rng,
            conf,
        };
        vm.load_font();
        vm
    }

    fn load_font(&mut self) {
        self.cpu.ram.load(FONTSET_START as usize, &FONTSET);
    }

    /// Load a program into memory, and point the program counter at its start.
    pub fn read_rom(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        if !check_program_size(bytecode) {
            return Err(Chip8Error::LargeProgram);
        }

        // Start with clean memory to avoid leaking previous program.
        self.cpu.clear_memory();

        // Reset fonts
        self.load_font();

        // Load program into virtual RAM
        self.cpu.ram.load(MEM_START, bytecode);

        // Reset the program counter to prepare for execution.
        self.cpu.jump(MEM_START as u32);
        self.timer.reset();

        Ok(())
    }
}

/// Kinds of work the last instruction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    /// - Bnnn (`JP V0, addr`)
    Jump,
    Draw,
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`). The program counter
    /// is rewound so the instruction is polled again on the next cycle.
    KeyWait,
    /// The opcode is not part of the instruction set and was skipped.
    Unsupported,
}

/// How the delay and sound timers count down.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum TimerMode {
    /// Decrement once for every executed instruction.
    #[default]
    PerInstruction,
    /// Decrement at 60Hz of wall clock time, checked between instructions.
    Realtime,
}

/// VM Configuration Parameters.
#[derive(Debug, Default, Clone)]
pub struct Chip8Conf {
    pub timer_mode: TimerMode,
    /// Seed for the `Cxnn` random number generator. Seeded from the OS when empty.
    pub seed: Option<u64>,
}

/// Interpreter
impl Chip8Vm {
    /// Sets the keyboard key input state.
    pub fn set_input(&mut self, key: KeyCode, pressed: bool) {
        self.cpu.keys.set(key, pressed);
    }

    pub fn apply_input(&mut self, event: InputEvent) {
        self.set_input(event.key, event.pressed)
    }

    /// Read the instruction at the program counter, and advance past it.
    pub fn fetch(&mut self) -> Opcode {
        let pc = self.cpu.pc() as usize;
        let opcode = Opcode::from_bytes(self.cpu.ram.get(pc), self.cpu.ram.get(pc + 1));

        self.cpu.skip();

        opcode
    }

    pub fn tick_timers(&mut self) {
        self.cpu.tick_timers();
    }

    /// Fetch, execute and count down timers once.
    pub fn step(&mut self) -> Chip8Result<Flow> {
        let opcode = self.fetch();
        let flow = self.execute(opcode)?;

        match self.conf.timer_mode {
            TimerMode::PerInstruction => self.cpu.tick_timers(),
            TimerMode::Realtime => {
                if self.timer.tick() {
                    self.cpu.tick_timers();
                }
            }
        }

        Ok(flow)
    }

    pub fn cycle(&mut self, count: usize) -> Chip8Result<()> {
        for _ in 0..count {
            self.step()?;
        }

        Ok(())
    }

    /// Decode and execute a single instruction.
    ///
    /// The program counter is expected to already point past the instruction.
    pub fn execute(&mut self, opcode: Opcode) -> Chip8Result<Flow> {
        let (vx, vy, n, nn, nnn) = (opcode.x(), opcode.y(), opcode.n(), opcode.nn(), opcode.nnn());

        let mut control_flow = Flow::Ok;

        match opcode.op() {
            // Miscellaneous instructions identified by nn
            0x0 | 0xE | 0xF => control_flow = self.exec_misc(opcode)?,
            // 1nnn (JP addr)
            //
            // Jump to address.
            0x1 => {
                op_trace("JP", &self.cpu, opcode);

                self.cpu.jump(nnn as u32);
                control_flow = Flow::Jump;
            }
            // 2nnn (CALL addr)
            //
            // Call subroutine at nnn.
            0x2 => {
                op_trace("CALL", &self.cpu, opcode);

                let return_address = self.cpu.pc();
                self.cpu.stack.push(return_address)?;
                self.cpu.jump(nnn as u32);
                control_flow = Flow::Jump;
            }
            // 3xnn (SE Vx, byte)
            //
            // Skip the next instruction if register VX equals value NN.
            0x3 => {
                op_trace("SE", &self.cpu, opcode);

                if self.cpu.v(vx) == nn {
                    self.cpu.skip();
                }
            }
            // 4xnn (SNE Vx, byte)
            //
            // Skip the next instruction if register VX does not equal value NN.
            0x4 => {
                op_trace("SNE", &self.cpu, opcode);

                if self.cpu.v(vx) != nn {
                    self.cpu.skip();
                }
            }
            // 5xy0 (SE Vx, Vy)
            //
            // Skip the next instruction if register VX equals value VY.
            0x5 => {
                op_trace("SE", &self.cpu, opcode);

                if self.cpu.v(vx) == self.cpu.v(vy) {
                    self.cpu.skip();
                }
            }
            // 6xnn (LD Vx, byte)
            //
            // Set register VX to value NN.
            0x6 => {
                op_trace("LD", &self.cpu, opcode);

                self.cpu.set_v(vx, nn as u32);
            }
            // 7xnn (ADD Vx, byte)
            //
            // Add value NN to register VX. Carry flag is not set.
            0x7 => {
                op_trace("ADD", &self.cpu, opcode);

                let x = self.cpu.v(vx);
                self.cpu.set_v(vx, x.wrapping_add(nn) as u32);
            }
            // Arithmetic instructions indentified by n
            0x8 => control_flow = self.exec_math(opcode),
            // 9xy0 (SNE Vx, Vy)
            //
            // Skip next instruction if Vx != Vy.
            0x9 => {
                op_trace("SNE", &self.cpu, opcode);

                if self.cpu.v(vx) != self.cpu.v(vy) {
                    self.cpu.skip();
                }
            }
            // Annn (LD I, addr)
            //
            // Set address register I to value NNN.
            0xA => {
                op_trace("LD I", &self.cpu, opcode);

                self.cpu.address.set(nnn as u32);
            }
            // Bnnn (JP V0, addr)
            //
            // Jump to address NNN offset by V0.
            0xB => {
                op_trace("JP V0", &self.cpu, opcode);

                self.cpu.jump(nnn as u32 + self.cpu.v(0) as u32);
                control_flow = Flow::Jump;
            }
            // Cxnn (RND Vx, byte)
            //
            // Generate random number.
            // Set register VX to the result of bitwise AND between a random number and NN.
            0xC => {
                op_trace("RND", &self.cpu, opcode);

                let value = self.rng.gen::<u8>() & nn;
                self.cpu.set_v(vx, value as u32);
            }
            // Dxyn (DRW Vx, Vy, nibble)
            //
            // Draw sprite to the display buffer, at coordinate as per registers Vx and Vy.
            // Sprite is encoded as 8 pixels wide, N pixels high, stored in bits located in
            // memory pointed to by address register I.
            //
            // If the sprite is drawn outside of the display area, it is wrapped around to the other side.
            //
            // If the drawing operation erases existing pixels in the display buffer, register VF is set to
            // 1, and set to 0 if no display bits are unset. This is used for collision detection.
            0xD => {
                op_trace("DRW", &self.cpu, opcode);

                self.cpu.set_flag(false);

                let addr = self.cpu.address() as usize;
                let mut rows = [0; 0xF];
                for (r, row) in rows.iter_mut().enumerate().take(n as usize) {
                    *row = self.cpu.ram.get(addr + r);
                }

                let (x, y) = (self.cpu.v(vx) as usize, self.cpu.v(vy) as usize);
                if self.cpu.display.draw(&rows[..n as usize], x, y) {
                    self.cpu.set_flag(true);
                }

                control_flow = Flow::Draw;
            }
            _ => control_flow = self.unsupported(opcode),
        }

        Ok(control_flow)
    }

    /// Execute an arithmetic instruction
    #[inline]
    #[must_use]
    fn exec_math(&mut self, opcode: Opcode) -> Flow {
        debug_assert_eq!(opcode.op(), 0x8);

        let (vx, vy) = (opcode.x(), opcode.y());
        let (x, y) = (self.cpu.v(vx), self.cpu.v(vy));

        match opcode.n() {
            // 8xy0 (LD Vx, Vy)
            //
            // Store the value of register VY in register VX.
            0x0 => {
                op_trace("LD", &self.cpu, opcode);

                self.cpu.set_v(vx, y as u32);
            }
            // 8xy1 (OR Vx, Vy)
            0x1 => {
                op_trace("OR", &self.cpu, opcode);

                self.cpu.set_v(vx, (x | y) as u32);
            }
            // 8xy2 (AND Vx, Vy)
            0x2 => {
                op_trace("AND", &self.cpu, opcode);

                self.cpu.set_v(vx, (x & y) as u32);
            }
            // 8xy3 (XOR Vx, Vy)
            0x3 => {
                op_trace("XOR", &self.cpu, opcode);

                self.cpu.set_v(vx, (x ^ y) as u32);
            }
            // 8xy4 (ADD Vx, Vy)
            //
            // ADDs VY to VX, and stores the result in VX.
            // Overflow is wrapped.
            // If overflow, set VF to 1, else 0.
            0x4 => {
                op_trace("ADD", &self.cpu, opcode);

                let result = x as u32 + y as u32;
                self.cpu.set_v(vx, result); // Overflow wrap
                self.cpu.set_flag(result > 0xFF);
            }
            // 8xy5 (SUB Vx, Vy)
            //
            // Subtracts VY from VX, and stores the result in VX.
            // VF is set to 1 when VX is strictly greater than VY, otherwise 0.
            0x5 => {
                op_trace("SUB", &self.cpu, opcode);

                self.cpu.set_v(vx, x.wrapping_sub(y) as u32);
                self.cpu.set_flag(x > y);
            }
            // 8xy6 (SHR Vx)
            //
            // Shift VX right by 1, the shifted out bit goes to VF.
            // VY is unused.
            0x6 => {
                op_trace("SHR", &self.cpu, opcode);

                self.cpu.set_v(vx, (x >> 1) as u32);
                self.cpu.set_flag(x & 1 == 1);
            }
            // 8xy7 (SUBN Vx, Vy)
            //
            // Subtracts VX from VY, and stores the result in VX.
            // VF is set to 1 when VY is strictly greater than VX, otherwise 0.
            0x7 => {
                op_trace("SUBN", &self.cpu, opcode);

                self.cpu.set_v(vx, y.wrapping_sub(x) as u32);
                self.cpu.set_flag(y > x);
            }
            // 8xyE (SHL Vx)
            //
            // Shift VX left by 1, the shifted out bit goes to VF.
            // VY is unused.
            0xE => {
                op_trace("SHL", &self.cpu, opcode);

                self.cpu.set_v(vx, (x as u32) << 1);
                self.cpu.set_flag((x >> 7) & 1 == 1);
            }
            // ----------------------------------------------------------------
            // Unsupported operation.
            _ => return self.unsupported(opcode),
        }

        Flow::Ok
    }

    /// Execute a miscellaneous instruction
    #[inline]
    fn exec_misc(&mut self, opcode: Opcode) -> Chip8Result<Flow> {
        let vx = opcode.x();

        let mut control_flow = Flow::Ok;

        match (opcode.op(), opcode.nn()) {
            // ----------------------------------------------------------------
            // 00E0 (CLS)
            //
            // Clear display
            (0x0, 0xE0) if vx == 0 => {
                op_trace("CLS", &self.cpu, opcode);

                self.cpu.display.clear();
            }
            // 00EE (RET)
            //
            // Return from a subroutine.
            // Set the program counter to the value at the top of the stack.
            (0x0, 0xEE) if vx == 0 => {
                op_trace("RET", &self.cpu, opcode);

                let address = self.cpu.stack.pop()?;
                self.cpu.jump(address as u32);
                control_flow = Flow::Jump;
            }
            // ----------------------------------------------------------------
            // Ex9E (SKP Vx)
            (0xE, 0x9E) => {
                op_trace("SKP", &self.cpu, opcode);

                if self.cpu.keys.is_pressed(self.cpu.v(vx)) {
                    self.cpu.skip();
                }
            }
            // ExA1 (SKNP Vx)
            (0xE, 0xA1) => {
                op_trace("SKNP", &self.cpu, opcode);

                if !self.cpu.keys.is_pressed(self.cpu.v(vx)) {
                    self.cpu.skip();
                }
            }
            // ----------------------------------------------------------------
            // Fx07 (LD Vx, DT)
            //
            // Set Vx = delay timer value.
            (0xF, 0x07) => {
                op_trace("LD DT", &self.cpu, opcode);

                self.cpu.set_v(vx, self.cpu.delay_timer.get());
            }
            // Fx0A (LD Vx, K)
            //
            // Wait for a key press, store the value of the key in Vx.
            (0xF, 0x0A) => {
                op_trace("LD K", &self.cpu, opcode);

                if let Some(k) = self.cpu.keys.first() {
                    self.cpu.set_v(vx, k as u32);
                } else {
                    // rewind the program counter to stall the machine
                    self.cpu.rewind();
                    control_flow = Flow::KeyWait;
                }
            }
            // Fx15 (LD DT, Vx)
            //
            // Set delay timer = Vx.
            (0xF, 0x15) => {
                op_trace("LD DT", &self.cpu, opcode);

                self.cpu.delay_timer.set(self.cpu.v(vx) as u32);
            }
            // Fx18 (LD ST, Vx)
            //
            // Set sound timer = Vx.
            (0xF, 0x18) => {
                op_trace("LD ST", &self.cpu, opcode);

                self.cpu.sound_timer.set(self.cpu.v(vx) as u32);
                control_flow = Flow::Sound;
            }
            // Fx1E (ADD I, Vx)
            //
            // Add Vx to I. VF is left alone on overflow.
            (0xF, 0x1E) => {
                op_trace("ADD I", &self.cpu, opcode);

                let addr = self.cpu.address.get();
                self.cpu.address.set(addr + self.cpu.v(vx) as u32);
            }
            // Fx29 (LD F, Vx)
            //
            // Set I = location of sprite for digit Vx.
            (0xF, 0x29) => {
                op_trace("LD F", &self.cpu, opcode);

                let digit = (self.cpu.v(vx) & 0xF) as u32;
                self.cpu
                    .address
                    .set(FONTSET_START as u32 + digit * FONTSET_HEIGHT as u32);
            }
            // Fx33 (LD B, Vx)
            //
            // Store the binary-coded decimal representation of Vx
            // in the memory locations I, I+1, and I+2.
            #[rustfmt::skip]
            (0xF, 0x33) => {
                op_trace("LD B", &self.cpu, opcode);

                let addr = self.cpu.address() as usize;
                let x = self.cpu.v(vx) as usize;
                self.cpu.ram.set(addr,     x / 100);
                self.cpu.ram.set(addr + 1, x / 10 % 10);
                self.cpu.ram.set(addr + 2, x % 10);
            }
            // Fx55 (LD [I], Vx)
            //
            // Store registers V0 through Vx in memory starting at location I.
            (0xF, 0x55) => {
                op_trace("LD [I]", &self.cpu, opcode);

                let addr = self.cpu.address() as usize;
                for v in 0..=vx {
                    self.cpu.ram.set(addr + v, self.cpu.v(v) as usize);
                }
            }
            // Fx65 (LD Vx, [I])
            //
            // Read registers V0 through Vx from memory starting at location I.
            (0xF, 0x65) => {
                op_trace("LD Vx", &self.cpu, opcode);

                let addr = self.cpu.address() as usize;
                for v in 0..=vx {
                    let value = self.cpu.ram.get(addr + v);
                    self.cpu.set_v(v, value as u32);
                }
            }
            // ----------------------------------------------------------------
            // Unsupported operation.
            _ => control_flow = self.unsupported(opcode),
        }

        Ok(control_flow)
    }

    /// Report an opcode outside of the instruction set. Execution carries on.
    #[cold]
    fn unsupported(&self, opcode: Opcode) -> Flow {
        let at = self.cpu.pc().wrapping_sub(2) & ADDRESS_MASK;
        warn!("unsupported opcode {opcode} at {at:03X}");
        Flow::Unsupported
    }
}

/// State inspection
impl Chip8Vm {
    pub fn pc(&self) -> Address {
        self.cpu.pc()
    }

    /// Address register I.
    pub fn index(&self) -> u16 {
        self.cpu.address()
    }

    /// Value of general purpose register `Vx`.
    pub fn register(&self, x: usize) -> u8 {
        self.cpu.v(x)
    }

    pub fn delay_timer(&self) -> u8 {
        self.cpu.delay_timer.get() as u8
    }

    pub fn sound_timer(&self) -> u8 {
        self.cpu.sound_timer.get() as u8
    }

    pub fn keys(&self) -> &Keypad {
        &self.cpu.keys
    }

    pub fn memory(&self) -> &Memory {
        &self.cpu.ram
    }

    pub fn stack(&self) -> &Stack {
        &self.cpu.stack
    }

    pub fn display(&self) -> &Display {
        &self.cpu.display
    }

    pub fn dump_display(&self) -> Result<String, std::fmt::Error> {
        self.cpu.display.dump()
    }
}

impl Steppable for Chip8Vm {
    fn cycle(&mut self, count: usize) -> Chip8Result<()> {
        Chip8Vm::cycle(self, count)
    }

    fn display(&self) -> &Display {
        Chip8Vm::display(self)
    }
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace(name: &str, cpu: &Chip8Cpu, opcode: Opcode) {
    let at = cpu.pc().wrapping_sub(2) & ADDRESS_MASK;
    log::trace!("{at:04X}: {name:6} {opcode}");
}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace(_: &str, _: &Chip8Cpu, _: Opcode) {}
