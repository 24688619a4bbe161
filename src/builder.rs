use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::{
    Config, Engine, Result,
    services::{AdmissionGate, AllowAll, BillingEmitter, BuyerDirectory, DeclaredBuyers, FlowStore, LogBilling},
};

/// Builder for [`Engine`], with optional collaborator injection.
pub struct EngineBuilder {
    config: Config,
    rt: Option<Arc<Runtime>>,
    store: Option<Arc<dyn FlowStore>>,
    directory: Arc<dyn BuyerDirectory>,
    admission: Arc<dyn AdmissionGate>,
    billing: Arc<dyn BillingEmitter>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            rt: None,
            store: None,
            directory: Arc::new(DeclaredBuyers),
            admission: Arc::new(AllowAll),
            billing: Arc::new(LogBilling),
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.config.async_worker_thread_number = n;
        self
    }

    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    /// External source of published flows, consulted when a flow was not
    /// deployed through the engine directly.
    pub fn flow_store(
        mut self,
        store: Arc<dyn FlowStore>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    pub fn buyer_directory(
        mut self,
        directory: Arc<dyn BuyerDirectory>,
    ) -> Self {
        self.directory = directory;
        self
    }

    pub fn admission_gate(
        mut self,
        admission: Arc<dyn AdmissionGate>,
    ) -> Self {
        self.admission = admission;
        self
    }

    pub fn billing_emitter(
        mut self,
        billing: Arc<dyn BillingEmitter>,
    ) -> Self {
        self.billing = billing;
        self
    }

    pub fn build(&self) -> Result<Engine> {
        let runtime = if self.rt.is_some() {
            self.rt.as_ref().unwrap().clone()
        } else {
            Arc::new(Builder::new_multi_thread().worker_threads(self.config.async_worker_thread_number.into()).enable_all().build().unwrap())
        };
        let engine = Engine::assemble(
            runtime,
            self.config.clone(),
            self.store.clone(),
            self.directory.clone(),
            self.admission.clone(),
            self.billing.clone(),
        );

        Ok(engine)
    }
}
