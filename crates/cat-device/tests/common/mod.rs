#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cat_device::{Device, DeviceBuilder, DeviceConfig, ShutdownSync};
use cat_devkit::{
    Console, DebugTarget, DebuggerOwner, DeviceError, DeviceManager, DeviceResult, EventInfo,
    EventKind, ExceptionInfo, ExecState, ModuleInfo, Notification, NotificationReceiver,
    NotificationSender, PdbSignature, RebootKind, SymbolLookup,
};

pub const DEBUGGER_NAME: &str = "CAT-test";

pub type TestDevice = Device<FakeManager, FakeSymbols>;

#[derive(Default)]
struct State {
    reachable: bool,
    fail_open: bool,
    opened: usize,
    closed: usize,
    modules: Vec<ModuleInfo>,
    breakpoints: BTreeSet<u32>,
    owner: Option<DebuggerOwner>,
    calls: Vec<String>,
    notifier: Option<NotificationSender<FakeEvent>>,
}

/// Scripted devkit, shared by all the console handles it opens.
#[derive(Clone)]
pub struct FakeDevkit {
    state: Arc<Mutex<State>>,
    released: Arc<AtomicUsize>,
}

impl FakeDevkit {
    pub fn new() -> Self {
        let state = State {
            reachable: true,
            modules: vec![module("xboxkrnl.exe", 0x8004_0000)],
            ..State::default()
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn manager(&self) -> FakeManager {
        FakeManager {
            devkit: self.clone(),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state().reachable = reachable;
    }

    pub fn fail_open(&self) {
        self.state().fail_open = true;
    }

    pub fn set_modules(&self, modules: Vec<ModuleInfo>) {
        self.state().modules = modules;
    }

    pub fn set_owner(&self, name: &str) {
        self.state().owner = Some(DebuggerOwner {
            name: name.to_owned(),
            user: Some("someone".to_owned()),
        });
    }

    pub fn owner(&self) -> Option<String> {
        self.state().owner.as_ref().map(|owner| owner.name.clone())
    }

    pub fn opened(&self) -> usize {
        self.state().opened
    }

    pub fn closed(&self) -> usize {
        self.state().closed
    }

    pub fn breakpoints(&self) -> Vec<u32> {
        self.state().breakpoints.iter().copied().collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of events released so far.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Pushes a notification to the current subscriber.
    pub fn notify(&self, kind: EventKind, event: FakeEvent) {
        let notifier = self.state().notifier.clone().expect("no subscriber");
        notifier.send(Notification::new(kind, event)).unwrap();
    }

    pub fn event(&self) -> FakeEvent {
        FakeEvent {
            stopped: false,
            thread_id: None,
            exec_state: None,
            message: None,
            exception: None,
            module: None,
            function: None,
            released: self.released.clone(),
        }
    }

    pub fn stopped_event(&self, thread_id: u32) -> FakeEvent {
        let mut event = self.event();
        event.stopped = true;
        event.thread_id = Some(thread_id);
        event
    }

    pub fn module_event(&self, name: &str, base_addr: u32) -> FakeEvent {
        let mut event = self.stopped_event(1);
        event.module = Some(module(name, base_addr));
        event
    }

    pub fn break_event(&self, thread_id: u32, function: u32) -> FakeEvent {
        let mut event = self.stopped_event(thread_id);
        event.function = Some(function);
        event
    }

    pub fn exception_event(&self, thread_id: u32, code: u32, first_chance: bool) -> FakeEvent {
        let mut event = self.stopped_event(thread_id);
        event.exception = Some(ExceptionInfo {
            code,
            address: 0x8200_4000,
            first_chance,
            non_continuable: false,
        });
        event
    }

    pub fn debug_string(&self, message: &str) -> FakeEvent {
        let mut event = self.event();
        event.message = Some(message.to_owned());
        event
    }

    fn call(&self, call: String) -> DeviceResult<()> {
        let mut state = self.state();
        state.calls.push(call);

        if state.reachable {
            Ok(())
        } else {
            Err(DeviceError::Unreachable("console is offline".to_owned()))
        }
    }
}

pub fn module(name: &str, base_addr: u32) -> ModuleInfo {
    ModuleInfo {
        name: name.to_owned(),
        base_addr,
        size: 0x0010_0000,
    }
}

pub struct FakeManager {
    devkit: FakeDevkit,
}

impl DeviceManager for FakeManager {
    type Console = FakeConsole;

    async fn open_console(&self, name_or_addr: &str) -> DeviceResult<FakeConsole> {
        let mut state = self.devkit.state();

        if state.fail_open {
            return Err(DeviceError::Unreachable(format!("{name_or_addr}: no route")));
        }

        state.opened += 1;

        Ok(FakeConsole {
            devkit: self.devkit.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

pub struct FakeConsole {
    devkit: FakeDevkit,
    closed: AtomicBool,
}

impl FakeConsole {
    fn call(&self, call: String) -> DeviceResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DeviceError::Closed);
        }

        self.devkit.call(call)
    }
}

impl DebugTarget for FakeConsole {
    async fn debugger_owner(&self) -> DeviceResult<Option<DebuggerOwner>> {
        self.call("debugger_owner".to_owned())?;
        Ok(self.devkit.state().owner.clone())
    }

    async fn connect_as_debugger(&self, name: &str, force: bool) -> DeviceResult<()> {
        self.call(format!("connect_as_debugger {name} {force}"))?;

        self.devkit.state().owner = Some(DebuggerOwner {
            name: name.to_owned(),
            user: None,
        });
        Ok(())
    }

    async fn disconnect_as_debugger(&self) -> DeviceResult<()> {
        self.call("disconnect_as_debugger".to_owned())?;

        let mut state = self.devkit.state();
        if state
            .owner
            .as_ref()
            .is_some_and(|owner| owner.name == DEBUGGER_NAME)
        {
            state.owner = None;
        }
        Ok(())
    }

    async fn stop_on_module_load(&self, enable: bool) -> DeviceResult<()> {
        self.call(format!("stop_on_module_load {enable}"))
    }

    async fn set_breakpoint(&self, addr: u32) -> DeviceResult<()> {
        self.call(format!("set_breakpoint {addr:#x}"))?;
        self.devkit.state().breakpoints.insert(addr);
        Ok(())
    }

    async fn remove_breakpoint(&self, addr: u32) -> DeviceResult<()> {
        self.call(format!("remove_breakpoint {addr:#x}"))?;
        self.devkit.state().breakpoints.remove(&addr);
        Ok(())
    }

    async fn remove_all_breakpoints(&self) -> DeviceResult<()> {
        self.call("remove_all_breakpoints".to_owned())?;
        self.devkit.state().breakpoints.clear();
        Ok(())
    }

    async fn pdb_signature(&self, module_base: u32) -> DeviceResult<Option<PdbSignature>> {
        self.call(format!("pdb_signature {module_base:#x}"))?;

        Ok(Some(PdbSignature {
            guid: [0; 16],
            age: 1,
            path: None,
        }))
    }

    async fn continue_thread(&self, thread_id: u32, _exception: bool) -> DeviceResult<()> {
        self.call(format!("continue_thread {thread_id}"))
    }

    async fn go(&self) -> DeviceResult<()> {
        self.call("go".to_owned())
    }
}

impl Console for FakeConsole {
    type Event = FakeEvent;

    async fn find_console(&self) -> DeviceResult<String> {
        self.call("find_console".to_owned())?;
        Ok("devkit-04".to_owned())
    }

    async fn reboot(&self, kind: RebootKind) -> DeviceResult<()> {
        self.call(format!("reboot {kind:?}"))?;

        let mut state = self.devkit.state();
        state.reachable = false;
        state.notifier = None;
        state.breakpoints.clear();
        Ok(())
    }

    async fn running_modules(&self) -> DeviceResult<Vec<ModuleInfo>> {
        self.call("running_modules".to_owned())?;
        Ok(self.devkit.state().modules.clone())
    }

    async fn subscribe(&self) -> DeviceResult<NotificationReceiver<FakeEvent>> {
        self.call("subscribe".to_owned())?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        // the console greets new subscribers with its execution state
        let mut hello = self.devkit.event();
        hello.exec_state = Some(ExecState::Running);
        tx.send(Notification::new(EventKind::ExecStateChange, hello))
            .unwrap();

        self.devkit.state().notifier = Some(tx);
        Ok(rx)
    }

    async fn unsubscribe(&self) -> DeviceResult<()> {
        self.call("unsubscribe".to_owned())?;
        self.devkit.state().notifier = None;
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.devkit.state().closed += 1;
        }
    }
}

/// Notification payload, counting its releases.
#[derive(Debug)]
pub struct FakeEvent {
    pub stopped: bool,
    pub thread_id: Option<u32>,
    pub exec_state: Option<ExecState>,
    pub message: Option<String>,
    pub exception: Option<ExceptionInfo>,
    pub module: Option<ModuleInfo>,
    pub function: Option<u32>,
    released: Arc<AtomicUsize>,
}

impl EventInfo for FakeEvent {
    fn is_thread_stopped(&self) -> bool {
        self.stopped
    }

    fn exec_state(&self) -> Option<ExecState> {
        self.exec_state
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    fn exception(&self) -> Option<ExceptionInfo> {
        self.exception
    }

    fn module(&self) -> Option<&ModuleInfo> {
        self.module.as_ref()
    }

    fn thread_id(&self) -> Option<u32> {
        self.thread_id
    }

    fn top_frame_function(&self) -> DeviceResult<u32> {
        self.function
            .ok_or_else(|| DeviceError::Protocol("no stack".to_owned()))
    }
}

impl Drop for FakeEvent {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Symbol store knowing the offset of a few functions per module.
#[derive(Default)]
pub struct FakeSymbols {
    offsets: HashMap<(String, String), u32>,
}

impl FakeSymbols {
    pub fn with(mut self, module: &str, symbol: &str, offset: u32) -> Self {
        self.offsets
            .insert((module.to_owned(), symbol.to_owned()), offset);
        self
    }
}

impl SymbolLookup for FakeSymbols {
    async fn lookup(
        &self,
        symbol: &str,
        module: &ModuleInfo,
        _signature: &PdbSignature,
    ) -> Option<u32> {
        self.offsets
            .get(&(module.name.clone(), symbol.to_owned()))
            .map(|offset| module.base_addr + offset)
    }
}

pub fn test_config() -> DeviceConfig {
    DeviceConfig {
        debugger_name: DEBUGGER_NAME.to_owned(),
        ..DeviceConfig::default()
    }
}

pub fn build_device(devkit: &FakeDevkit, symbols: FakeSymbols, shutdown: ShutdownSync) -> TestDevice {
    DeviceBuilder::new()
        .with_manager(devkit.manager())
        .with_symbols(symbols)
        .config(test_config())
        .shutdown(shutdown)
        .build("devkit-04")
}

/// Records the results passed to a connection callback.
#[derive(Clone, Default)]
pub struct Completions(Arc<Mutex<Vec<bool>>>);

impl Completions {
    pub fn callback(&self) -> impl Fn(&TestDevice, bool) + Send + Sync + 'static {
        let results = self.0.clone();
        move |_, success| results.lock().unwrap().push(success)
    }

    pub fn get(&self) -> Vec<bool> {
        self.0.lock().unwrap().clone()
    }
}

/// Connects the device, and waits for the first notification.
pub async fn connect(device: &TestDevice) -> Completions {
    let completions = Completions::default();
    device.connect(completions.callback()).unwrap();

    let mut status = device.subscribe_status();
    tokio::time::timeout(
        Duration::from_secs(10),
        status.wait_for(|state| state.is_responding()),
    )
    .await
    .unwrap()
    .unwrap();

    completions
}

/// Waits (in virtual time) until the given condition holds.
pub async fn until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(600), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never met");
}
