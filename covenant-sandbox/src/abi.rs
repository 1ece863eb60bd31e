//! Byte-buffer calling convention between host and guest.
//!
//! Guest functions only see `i32` values, so every byte array crosses the
//! boundary as a pointer into guest memory. A buffer at pointer `p` is laid
//! out as:
//!
//! ```text
//! [p, p+4)        u32 little-endian payload length L
//! [p+4, p+4+L)    payload
//! ```
//!
//! The host obtains `p` by calling the guest allocator with `L + 4`.
//! Buffers are never handed back to `p8e_free`: an instance lives for a
//! single execution and its whole memory is dropped with it.

use crate::SandboxError;
use std::fmt;
use wasmtime::{Engine, Instance, Memory, Module, Store, Val, ValType};

/// Guest allocator export: `(size: i32) -> i32`.
pub const ALLOCATOR: &str = "p8e_allocate";

/// Guest deallocator export: `(ptr: i32) -> i32`. Declared by guests, unused by the host.
pub const DEALLOCATOR: &str = "p8e_free";

/// Zero-argument export returning the contract metadata buffer.
pub const ENTRYPOINT: &str = "__p8e_entrypoint";

/// Linear memory export.
pub const MEMORY: &str = "memory";

const LEN_PREFIX: usize = 4;

/// A live guest instance with its own store.
pub struct ModuleInstance {
    store: Store<()>,
    instance: Instance,
}

// Store contents are opaque outside a call.
impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance").finish_non_exhaustive()
    }
}

impl ModuleInstance {
    /// Compile and instantiate a module with no imports.
    pub fn new(engine: &Engine, module_bytes: &[u8]) -> Result<Self, SandboxError> {
        let module =
            Module::new(engine, module_bytes).map_err(|e| SandboxError::Compile(format!("{e:#}")))?;
        Self::from_module(engine, &module)
    }

    /// Instantiate an already compiled module.
    pub fn from_module(engine: &Engine, module: &Module) -> Result<Self, SandboxError> {
        let mut store = Store::new(engine, ());
        let instance = Instance::new(&mut store, module, &[])
            .map_err(|e| SandboxError::Instantiate(format!("{e:#}")))?;
        Ok(Self { store, instance })
    }

    /// True if the guest exports a function named `name`.
    pub fn has_function(&mut self, name: &str) -> bool {
        self.instance.get_func(&mut self.store, name).is_some()
    }

    /// Call `name` with each argument written to guest memory, and read the
    /// returned buffer back.
    pub fn call(&mut self, name: &str, args: &[&[u8]]) -> Result<Vec<u8>, SandboxError> {
        let pointers = args
            .iter()
            .map(|arg| self.write_buffer(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let result = self.call_i32(name, &pointers)?;
        self.read_buffer(result)
    }

    /// Call an export taking `args.len()` i32s and returning one i32.
    pub fn call_i32(&mut self, name: &str, args: &[i32]) -> Result<i32, SandboxError> {
        let func = self
            .instance
            .get_func(&mut self.store, name)
            .ok_or_else(|| SandboxError::MissingExport(name.to_string()))?;

        let ty = func.ty(&self.store);
        let params_ok = ty.params().len() == args.len() && ty.params().all(|p| matches!(p, ValType::I32));
        let results: Vec<ValType> = ty.results().collect();
        if !params_ok || !matches!(results.as_slice(), [ValType::I32]) {
            return Err(SandboxError::Signature {
                name: name.to_string(),
                expected: format!("{} i32 params -> i32", args.len()),
                actual: format!("{} params -> {} results", ty.params().len(), results.len()),
            });
        }

        let params: Vec<Val> = args.iter().copied().map(Val::I32).collect();
        let mut out = [Val::I32(0)];
        func.call(&mut self.store, &params, &mut out)
            .map_err(|e| SandboxError::Trap {
                function: name.to_string(),
                message: format!("{e:#}"),
            })?;

        match out[0] {
            Val::I32(value) => Ok(value),
            _ => Err(SandboxError::Signature {
                name: name.to_string(),
                expected: "i32 result".to_string(),
                actual: "non-i32 result".to_string(),
            }),
        }
    }

    /// Allocate a guest buffer and copy `data` into it. Returns the pointer.
    pub fn write_buffer(&mut self, data: &[u8]) -> Result<i32, SandboxError> {
        let len = u32::try_from(data.len()).map_err(|_| SandboxError::BufferTooLarge(data.len()))?;
        let size = data
            .len()
            .checked_add(LEN_PREFIX)
            .and_then(|n| i32::try_from(n).ok())
            .ok_or(SandboxError::BufferTooLarge(data.len()))?;

        let ptr = self.call_i32(ALLOCATOR, &[size])?;
        let memory = self.memory()?;
        let offset = guest_offset(ptr);

        memory
            .write(&mut self.store, offset, &len.to_le_bytes())
            .map_err(|_| SandboxError::OutOfBounds { offset, len: LEN_PREFIX })?;
        memory
            .write(&mut self.store, offset + LEN_PREFIX, data)
            .map_err(|_| SandboxError::OutOfBounds {
                offset: offset + LEN_PREFIX,
                len: data.len(),
            })?;
        Ok(ptr)
    }

    /// Read the length-prefixed buffer at `ptr`.
    pub fn read_buffer(&mut self, ptr: i32) -> Result<Vec<u8>, SandboxError> {
        let memory = self.memory()?;
        let offset = guest_offset(ptr);

        let mut prefix = [0u8; LEN_PREFIX];
        memory
            .read(&self.store, offset, &mut prefix)
            .map_err(|_| SandboxError::OutOfBounds { offset, len: LEN_PREFIX })?;
        let len = u32::from_le_bytes(prefix) as usize;

        let start = offset + LEN_PREFIX;
        let mut payload = vec![0u8; len];
        memory
            .read(&self.store, start, &mut payload)
            .map_err(|_| SandboxError::OutOfBounds { offset: start, len })?;
        Ok(payload)
    }

    fn memory(&mut self) -> Result<Memory, SandboxError> {
        self.instance
            .get_memory(&mut self.store, MEMORY)
            .ok_or_else(|| SandboxError::MissingExport(MEMORY.to_string()))
    }
}

/// Guest pointers are unsigned 32-bit addresses carried in an i32.
fn guest_offset(ptr: i32) -> usize {
    ptr as u32 as usize
}
