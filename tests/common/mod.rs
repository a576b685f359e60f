#![allow(dead_code)]

use pywatc::{
    CodegenOptions, Session,
    backend::module::{
        ENTRY_EXPORT, IMPORT_MODULE, MEMORY_IMPORT, MEMORY_MODULE, PRINT_GLOBAL_IMPORT,
        PRINT_IMPORT,
    },
    error::CompileError,
    frontend::SourceFile,
};
use wasmtime::{Caller, Engine, Linker, Memory, MemoryType, Module, Store};

/// What the host reporters saw
#[derive(Debug, Default)]
pub struct Host {
    pub printed: Vec<i32>,
    pub globals: Vec<(i32, i32)>,
}

/// Compiles units in one session and runs each in the same store, so linear
/// memory persists from unit to unit the way it does in a REPL.
pub struct Runner {
    session: Session,
    engine: Engine,
    linker: Linker<Host>,
    store: Store<Host>,
}

impl Runner {
    pub fn new() -> Self {
        let engine = Engine::default();
        let mut store = Store::new(&engine, Host::default());
        let memory = Memory::new(&mut store, MemoryType::new(1, None)).unwrap();

        let mut linker = Linker::new(&engine);
        linker
            .func_wrap(
                IMPORT_MODULE,
                PRINT_IMPORT,
                |mut caller: Caller<'_, Host>, value: i32| -> i32 {
                    caller.data_mut().printed.push(value);
                    value
                },
            )
            .unwrap();
        linker
            .func_wrap(
                IMPORT_MODULE,
                PRINT_GLOBAL_IMPORT,
                |mut caller: Caller<'_, Host>, slot: i32, value: i32| {
                    caller.data_mut().globals.push((slot, value));
                },
            )
            .unwrap();
        linker
            .define(&store, MEMORY_MODULE, MEMORY_IMPORT, memory)
            .unwrap();

        Self {
            session: Session::new(CodegenOptions::default()),
            engine,
            linker,
            store,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn host(&self) -> &Host {
        self.store.data()
    }

    /// Compiles and runs one unit, returning the value of its trailing
    /// expression if it has one. Compile errors are returned; a module that
    /// fails to load or run is a test failure.
    pub fn run(&mut self, source: &str) -> Result<Option<i32>, CompileError> {
        let program = self.session.compile(&SourceFile::in_memory(source))?;
        let text = self.session.assemble(&program);

        let module = Module::new(&self.engine, &text)
            .unwrap_or_else(|error| panic!("invalid module: {error:?}\n{text}"));
        let instance = self
            .linker
            .instantiate(&mut self.store, &module)
            .unwrap_or_else(|error| panic!("instantiation failed: {error:?}\n{text}"));

        if program.returns_value {
            let entry = instance
                .get_typed_func::<(), i32>(&mut self.store, ENTRY_EXPORT)
                .unwrap();

            Ok(Some(entry.call(&mut self.store, ()).unwrap()))
        } else {
            let entry = instance
                .get_typed_func::<(), ()>(&mut self.store, ENTRY_EXPORT)
                .unwrap();

            entry.call(&mut self.store, ()).unwrap();

            Ok(None)
        }
    }

    /// Runs a unit that must end in an expression
    pub fn eval(&mut self, source: &str) -> i32 {
        match self.run(source) {
            Ok(Some(value)) => value,
            Ok(None) => panic!("unit has no trailing expression:\n{source}"),
            Err(error) => panic!("compile error: {error}\n{source}"),
        }
    }
}

pub fn eval(source: &str) -> i32 {
    Runner::new().eval(source)
}
