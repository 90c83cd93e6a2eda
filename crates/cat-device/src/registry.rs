use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::monitor::{ApiCall, ApiCallback};

/// Breakpoint installed for a monitored symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BreakpointRecord {
    /// Base address of the module containing the breakpoint.
    pub module_base: u32,

    /// Symbol owning the breakpoint.
    pub symbol: String,
}

/// Breakpoints, indexed both by address and by module.
///
/// Both indices are only modified together, so that every breakpoint
/// address is listed under its module, and every address listed under a
/// module has a breakpoint record.
#[derive(Debug, Default)]
pub(crate) struct BreakpointIndex {
    by_addr: HashMap<u32, BreakpointRecord>,
    by_module: HashMap<u32, IndexSet<u32>>,
}

impl BreakpointIndex {
    /// Adds a breakpoint.
    ///
    /// Returns `false` if a breakpoint already exists at this address.
    pub fn insert(&mut self, addr: u32, module_base: u32, symbol: &str) -> bool {
        if self.by_addr.contains_key(&addr) {
            return false;
        }

        self.by_addr.insert(
            addr,
            BreakpointRecord {
                module_base,
                symbol: symbol.to_owned(),
            },
        );
        self.by_module.entry(module_base).or_default().insert(addr);

        true
    }

    /// Removes every breakpoint of the given module.
    pub fn remove_module(&mut self, module_base: u32) -> Vec<(u32, BreakpointRecord)> {
        let Some(addrs) = self.by_module.remove(&module_base) else {
            return Vec::new();
        };

        addrs
            .into_iter()
            .filter_map(|addr| self.by_addr.remove(&addr).map(|record| (addr, record)))
            .collect()
    }

    /// Removes every breakpoint of the given symbol.
    pub fn remove_symbol(&mut self, symbol: &str) -> Vec<u32> {
        let addrs: Vec<u32> = self
            .by_addr
            .iter()
            .filter(|(_, record)| record.symbol == symbol)
            .map(|(addr, _)| *addr)
            .collect();

        for addr in &addrs {
            let Some(record) = self.by_addr.remove(addr) else {
                continue;
            };

            if let Some(module_addrs) = self.by_module.get_mut(&record.module_base) {
                module_addrs.shift_remove(addr);
                if module_addrs.is_empty() {
                    self.by_module.remove(&record.module_base);
                }
            }
        }

        addrs
    }

    /// Returns the breakpoint at the given address.
    pub fn get(&self, addr: u32) -> Option<&BreakpointRecord> {
        self.by_addr.get(&addr)
    }

    pub fn clear(&mut self) {
        self.by_addr.clear();
        self.by_module.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        let addrs_listed = self.by_addr.iter().all(|(addr, record)| {
            self.by_module
                .get(&record.module_base)
                .is_some_and(|addrs| addrs.contains(addr))
        });

        let records_exist = self.by_module.iter().all(|(module_base, addrs)| {
            !addrs.is_empty()
                && addrs.iter().all(|addr| {
                    self.by_addr
                        .get(addr)
                        .is_some_and(|record| record.module_base == *module_base)
                })
        });

        addrs_listed && records_exist
    }
}

/// Monitored symbol, shared by all of its sessions.
pub(crate) struct SymbolState {
    pub name: String,

    /// Number of loaded modules in which a breakpoint is installed.
    pub load_count: AtomicU32,
}

impl SymbolState {
    pub fn load_count(&self) -> u32 {
        self.load_count.load(Ordering::Acquire)
    }
}

/// Subscription of a caller to a monitored symbol.
pub(crate) struct SessionState {
    pub id: u64,
    pub symbol: Arc<SymbolState>,
    pub was_called: AtomicBool,
    callback: ApiCallback,
}

impl SessionState {
    /// Records a call of the monitored function, and runs the callback.
    pub fn notify(&self, call: &ApiCall) {
        self.was_called.store(true, Ordering::Release);

        let callback = std::panic::AssertUnwindSafe(|| (self.callback)(call));
        if std::panic::catch_unwind(callback).is_err() {
            tracing::warn!(symbol = %call.symbol, "API monitor callback panicked");
        }
    }
}

struct MonitoredSymbol {
    state: Arc<SymbolState>,
    sessions: IndexMap<u64, Arc<SessionState>>,
}

/// Monitored symbols and their breakpoints.
#[derive(Default)]
pub(crate) struct Registry {
    symbols: HashMap<String, MonitoredSymbol>,
    index: BreakpointIndex,
    next_session_id: u64,
}

impl Registry {
    /// Adds a session to the given symbol, which is created if needed.
    ///
    /// Returns whether the symbol was created.
    pub fn add_session(&mut self, name: &str, callback: ApiCallback) -> (Arc<SessionState>, bool) {
        let mut created = false;

        let symbol = self.symbols.entry(name.to_owned()).or_insert_with(|| {
            created = true;
            MonitoredSymbol {
                state: Arc::new(SymbolState {
                    name: name.to_owned(),
                    load_count: AtomicU32::new(0),
                }),
                sessions: IndexMap::new(),
            }
        });

        self.next_session_id += 1;
        let session = Arc::new(SessionState {
            id: self.next_session_id,
            symbol: symbol.state.clone(),
            was_called: AtomicBool::new(false),
            callback,
        });
        symbol.sessions.insert(session.id, session.clone());

        (session, created)
    }

    /// Removes a session.
    ///
    /// If it was the last session of its symbol, the symbol is removed and
    /// the addresses of its breakpoints are returned.
    pub fn remove_session(&mut self, name: &str, id: u64) -> Option<Vec<u32>> {
        let symbol = self.symbols.get_mut(name)?;
        symbol.sessions.shift_remove(&id);

        if !symbol.sessions.is_empty() {
            return None;
        }

        if let Some(symbol) = self.symbols.remove(name) {
            symbol.state.load_count.store(0, Ordering::Release);
        }

        Some(self.index.remove_symbol(name))
    }

    /// Records a breakpoint installed for the given symbol.
    ///
    /// Returns `false` (and records nothing) if the symbol is not monitored,
    /// or if a breakpoint already exists at this address.
    pub fn register_breakpoint(&mut self, addr: u32, module_base: u32, name: &str) -> bool {
        let Some(symbol) = self.symbols.get(name) else {
            return false;
        };

        if !self.index.insert(addr, module_base, name) {
            return false;
        }

        symbol.state.load_count.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Forgets every breakpoint of the given module.
    ///
    /// Returns the number of breakpoints forgotten.
    pub fn unregister_module(&mut self, module_base: u32) -> usize {
        let records = self.index.remove_module(module_base);

        for (_, record) in &records {
            if let Some(symbol) = self.symbols.get(&record.symbol) {
                let _ = symbol.state.load_count.fetch_update(
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    |count| count.checked_sub(1),
                );
            }
        }

        records.len()
    }

    /// Forgets every breakpoint, keeping the monitored symbols.
    pub fn reset(&mut self) {
        self.index.clear();

        for symbol in self.symbols.values() {
            symbol.state.load_count.store(0, Ordering::Release);
        }
    }

    /// Returns the sessions to notify when the breakpoint at `addr` hits.
    pub fn subscribers_of(&self, addr: u32) -> Option<(ApiCall, Vec<Arc<SessionState>>)> {
        let record = self.index.get(addr)?;
        let symbol = self.symbols.get(&record.symbol)?;

        let call = ApiCall {
            symbol: record.symbol.clone(),
            address: addr,
        };

        Some((call, symbol.sessions.values().cloned().collect()))
    }

    pub fn has_breakpoints(&self) -> bool {
        !self.index.is_empty()
    }

    pub fn is_monitored(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn symbol_names(&self) -> Vec<String> {
        self.symbols.keys().cloned().collect()
    }

    #[cfg(test)]
    pub fn index(&self) -> &BreakpointIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{BreakpointIndex, Registry};
    use crate::monitor::ApiCallback;

    fn counting_callback() -> (ApiCallback, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let callback: ApiCallback = Arc::new({
            let calls = calls.clone();
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        (callback, calls)
    }

    #[test]
    fn index_stays_consistent() {
        let mut index = BreakpointIndex::default();

        assert!(index.insert(0x8200_1000, 0x8200_0000, "Foo"));
        assert!(index.insert(0x8200_2000, 0x8200_0000, "Bar"));
        assert!(index.insert(0x8100_1000, 0x8100_0000, "Foo"));
        assert!(!index.insert(0x8200_1000, 0x8200_0000, "Foo"));
        assert!(index.is_consistent());
        assert_eq!(index.len(), 3);

        assert_eq!(index.remove_symbol("Foo").len(), 2);
        assert!(index.is_consistent());
        assert_eq!(index.len(), 1);

        let removed = index.remove_module(0x8200_0000);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0, 0x8200_2000);
        assert!(index.is_consistent());
        assert!(index.is_empty());

        assert!(index.remove_module(0x8200_0000).is_empty());
    }

    #[test]
    fn load_count_accounting() {
        let mut registry = Registry::default();
        let (callback, _) = counting_callback();
        let (session, created) = registry.add_session("Foo", callback);
        assert!(created);

        let modules = [0x8200_0000u32, 0x8300_0000, 0x8400_0000, 0x8500_0000];

        for base in modules {
            assert!(registry.register_breakpoint(base + 0x1000, base, "Foo"));
            assert!(registry.index().is_consistent());
        }
        assert!(!registry.register_breakpoint(0x8200_1000, 0x8200_0000, "Foo"));
        assert!(!registry.register_breakpoint(0x8600_1000, 0x8600_0000, "Bar"));
        assert_eq!(session.symbol.load_count(), 4);

        // unload in another order than loaded
        for base in [0x8300_0000u32, 0x8500_0000, 0x8200_0000, 0x8400_0000] {
            assert_eq!(registry.unregister_module(base), 1);
            assert!(registry.index().is_consistent());
        }

        assert_eq!(session.symbol.load_count(), 0);
        assert!(!registry.has_breakpoints());

        // unknown modules do not underflow
        assert_eq!(registry.unregister_module(0x8200_0000), 0);
        assert_eq!(session.symbol.load_count(), 0);
    }

    #[test]
    fn session_fan_out() {
        let mut registry = Registry::default();

        let (cb1, calls1) = counting_callback();
        let (cb2, calls2) = counting_callback();
        let (cb3, calls3) = counting_callback();

        let (s1, created) = registry.add_session("Foo", cb1);
        assert!(created);
        let (s2, created) = registry.add_session("Foo", cb2);
        assert!(!created);
        let (s3, _) = registry.add_session("Foo", cb3);

        assert!(registry.register_breakpoint(0x8200_1000, 0x8200_0000, "Foo"));

        let (call, sessions) = registry.subscribers_of(0x8200_1000).unwrap();
        assert_eq!(call.symbol, "Foo");
        assert_eq!(sessions.len(), 3);
        sessions.iter().for_each(|s| s.notify(&call));

        assert_eq!(calls1.load(Ordering::SeqCst), 1);
        assert_eq!(calls2.load(Ordering::SeqCst), 1);
        assert_eq!(calls3.load(Ordering::SeqCst), 1);

        assert_eq!(registry.remove_session("Foo", s2.id), None);
        assert_eq!(registry.remove_session("Foo", s1.id), None);
        assert!(registry.has_breakpoints());

        let (_, sessions) = registry.subscribers_of(0x8200_1000).unwrap();
        assert_eq!(sessions.len(), 1);

        assert_eq!(
            registry.remove_session("Foo", s3.id),
            Some(vec![0x8200_1000])
        );
        assert!(!registry.has_breakpoints());
        assert!(!registry.is_monitored("Foo"));
        assert!(registry.subscribers_of(0x8200_1000).is_none());
    }

    #[test]
    fn panicking_callback_is_contained() {
        let mut registry = Registry::default();
        let (session, _) = registry.add_session("Foo", Arc::new(|_| unreachable!("boom")));
        assert!(registry.register_breakpoint(0x8200_1000, 0x8200_0000, "Foo"));

        let (call, sessions) = registry.subscribers_of(0x8200_1000).unwrap();
        sessions.iter().for_each(|s| s.notify(&call));

        assert!(session.was_called.load(Ordering::SeqCst));
    }

    #[test]
    fn reset_keeps_symbols() {
        let mut registry = Registry::default();
        let (callback, _) = counting_callback();
        let (session, _) = registry.add_session("Foo", callback);

        assert!(registry.register_breakpoint(0x8200_1000, 0x8200_0000, "Foo"));
        registry.reset();

        assert_eq!(session.symbol.load_count(), 0);
        assert!(!registry.has_breakpoints());
        assert_eq!(registry.symbol_names(), ["Foo"]);
    }
}
