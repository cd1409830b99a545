use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::esteps::types::*;
use crate::notify::Notifier;
use crate::octoprint::{
    CommandError, EventChannel, PluginCommand, PluginMessage, PrinterControl, EXTRUSION_COMPLETED,
    PLUGIN_IDENTIFIER,
};
use crate::rounding::Rounding;
use crate::storage::KeyValueStore;
use crate::telemetry::{create_command_span, generate_correlation_id};

#[derive(Debug, Clone)]
struct WorkflowState {
    steps: StepperAxes,
    parameters: CalibrationParameters,
    remained_length: f64,
    steps_loaded: bool,
    load: LoadState,
    extrude: ExtrudeState,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            steps: StepperAxes::default(),
            parameters: CalibrationParameters::default(),
            remained_length: DEFAULT_REMAINED_LENGTH,
            steps_loaded: false,
            load: LoadState::Idle,
            extrude: ExtrudeState::Idle,
        }
    }
}

/// Guided E-steps calibration: load → extrude → measure → compute → save.
///
/// Cloning is cheap and every clone shares the same state. The state lock is
/// never held across an `.await`, so command completions and pushed events
/// can interleave freely.
#[derive(Clone)]
pub struct CalibrationWorkflow {
    printer: Arc<dyn PrinterControl>,
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    rounding: Rounding,
    plugin_id: String,
    state: Arc<Mutex<WorkflowState>>,
    listener: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CalibrationWorkflow {
    pub fn new(
        printer: Arc<dyn PrinterControl>,
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            printer,
            store,
            notifier,
            rounding: Rounding::default(),
            plugin_id: PLUGIN_IDENTIFIER.to_string(),
            state: Arc::new(Mutex::new(WorkflowState::default())),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_rounding(mut self, rounding: Rounding) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn with_plugin_id(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = plugin_id.into();
        self
    }

    fn lock(&self) -> MutexGuard<'_, WorkflowState> {
        lock_state(&self.state)
    }

    // ---- lifecycle -------------------------------------------------------

    /// Subscribe to pushed plugin messages and restore the stored parameters.
    ///
    /// Calling it again replaces the previous listener. Outside a tokio
    /// runtime only the parameters are restored.
    pub fn initialize(&self, events: &dyn EventChannel) {
        let receiver = events.subscribe();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let state = Arc::clone(&self.state);
                let plugin_id = self.plugin_id.clone();
                let task = handle.spawn(listen(receiver, state, plugin_id));
                let mut listener = match self.listener.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if let Some(previous) = listener.replace(task) {
                    previous.abort();
                }
                debug!(plugin = %self.plugin_id, "Subscribed to plugin messages");
            }
            Err(_) => {
                warn!("No async runtime available, plugin messages will not be observed");
            }
        }

        self.restore_parameters();
    }

    /// Stop observing plugin messages
    pub fn shutdown(&self) {
        let mut listener = match self.listener.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(task) = listener.take() {
            task.abort();
            debug!("Plugin message listener stopped");
        }
    }

    /// Read the four parameters back from storage, using the default for any
    /// entry that is missing or does not start with a number
    pub fn restore_parameters(&self) -> CalibrationParameters {
        let mut restored = CalibrationParameters::default();
        for key in ParameterKey::ALL {
            let raw = self.store.get(key.storage_key());
            let value = raw.as_deref().and_then(|raw| key.parse_stored(raw));
            debug!(key = key.storage_key(), raw = ?raw, parsed = ?value, "Restored parameter");
            restored.set(key, value.unwrap_or_else(|| key.default_value()));
        }
        self.lock().parameters = restored;
        restored
    }

    // ---- parameters ------------------------------------------------------

    pub fn parameters(&self) -> CalibrationParameters {
        self.lock().parameters
    }

    /// Update one parameter and persist it immediately
    pub fn set_parameter(&self, key: ParameterKey, value: f64) {
        self.lock().parameters.set(key, value);
        self.persist(key, value);
    }

    pub fn set_extrude_temperature(&self, value: f64) {
        self.set_parameter(ParameterKey::ExtrudeTemperature, value);
    }

    pub fn set_extrude_length(&self, value: f64) {
        self.set_parameter(ParameterKey::ExtrudeLength, value);
    }

    pub fn set_extrude_speed(&self, value: f64) {
        self.set_parameter(ParameterKey::ExtrudeSpeed, value);
    }

    pub fn set_mark_length(&self, value: f64) {
        self.set_parameter(ParameterKey::MarkLength, value);
    }

    /// Put all four parameters back to their defaults, in memory and in storage
    pub fn reset_parameters(&self) {
        info!("Resetting calibration parameters to defaults");
        self.lock().parameters = CalibrationParameters::default();
        for key in ParameterKey::ALL {
            self.persist(key, key.default_value());
        }
    }

    fn persist(&self, key: ParameterKey, value: f64) {
        let text = value.to_string();
        match self.store.set(key.storage_key(), &text) {
            Ok(()) => debug!(key = key.storage_key(), value = %text, "Saved parameter"),
            Err(e) => warn!(key = key.storage_key(), error = %e, "Failed to persist parameter"),
        }
    }

    // ---- measurement and derived values -----------------------------------

    pub fn remained_length(&self) -> f64 {
        self.lock().remained_length
    }

    pub fn set_remained_length(&self, value: f64) {
        self.lock().remained_length = value;
    }

    /// `round(markLength - remainedLength)`
    pub fn actual_extrusion(&self) -> f64 {
        let state = self.lock();
        compute_actual_extrusion(&self.rounding, &state)
    }

    /// Corrected E-steps, or `NotAvailable` when steps are not loaded or the
    /// division would be by zero
    pub fn new_steps(&self) -> NewSteps {
        let state = self.lock();
        compute_new_steps(&self.rounding, &state)
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        let state = self.lock();
        WorkflowSnapshot {
            steps: state.steps,
            parameters: state.parameters,
            remained_length: state.remained_length,
            actual_extrusion: compute_actual_extrusion(&self.rounding, &state),
            new_steps: compute_new_steps(&self.rounding, &state),
            steps_loaded: state.steps_loaded,
            load_state: state.load,
            extrude_state: state.extrude,
        }
    }

    // ---- state -----------------------------------------------------------

    pub fn steps(&self) -> StepperAxes {
        self.lock().steps
    }

    pub fn steps_loaded(&self) -> bool {
        self.lock().steps_loaded
    }

    pub fn load_state(&self) -> LoadState {
        self.lock().load
    }

    pub fn extrude_state(&self) -> ExtrudeState {
        self.lock().extrude
    }

    pub fn is_loading(&self) -> bool {
        self.load_state() == LoadState::Loading
    }

    pub fn extrusion_in_progress(&self) -> bool {
        self.extrude_state() == ExtrudeState::Extruding
    }

    /// Treat an extrusion started elsewhere (another process, the web UI) as
    /// running so that it can be stopped from here
    pub fn adopt_running_extrusion(&self) {
        debug!("Adopting extrusion started elsewhere");
        self.lock().extrude = ExtrudeState::Extruding;
    }

    // ---- commands --------------------------------------------------------

    /// Fetch the current steps-per-mm from the printer.
    ///
    /// The loading flag is advisory: concurrent calls are all sent. A failure
    /// leaves the axes untouched and raises no notification.
    pub async fn load_steps(&self) -> Result<StepperAxes, CommandError> {
        let span = create_command_span("load_steps", &self.plugin_id, &generate_correlation_id());
        async {
            info!("Loading E-steps");
            self.lock().load = LoadState::Loading;

            let result = self.printer.send_command(&PluginCommand::LoadSteps).await;

            let mut state = self.lock();
            state.load = LoadState::Idle;
            match result {
                Ok(response) => {
                    debug!(%response, "eSteps_load response");
                    apply_load_response(&mut state, &response);
                    Ok(state.steps)
                }
                Err(e) => {
                    error!(error = %e, "Loading E-steps failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Start the heated test extrusion with the current parameters.
    /// Does nothing while an extrusion is already running.
    pub async fn start_extrusion(&self) -> Result<Dispatch, CommandError> {
        let span = create_command_span("start_extrusion", &self.plugin_id, &generate_correlation_id());
        async {
            let command = {
                let mut state = self.lock();
                if state.extrude == ExtrudeState::Extruding {
                    warn!("Extrusion already in progress, start request ignored");
                    return Ok(Dispatch::Ignored);
                }
                state.extrude = ExtrudeState::Extruding;
                PluginCommand::StartExtrusion {
                    extrude_temp: state.parameters.extrude_temperature,
                    extrude_length: state.parameters.extrude_length,
                    extrude_speed: state.parameters.extrude_speed,
                }
            };

            info!(?command, "Starting test extrusion");
            match self.printer.send_command(&command).await {
                Ok(response) => {
                    debug!(%response, "eSteps_startExtrusion response");
                    self.notifier.warning(
                        "E-steps calibration started",
                        "<b>Heating nozzle has started!</b><br>Extrusion is in progress. \
                         Wait for it to finish, measure the <b>length after extrusion</b> \
                         and save the new value.",
                    );
                    Ok(Dispatch::Sent)
                }
                Err(e) => {
                    error!(error = %e, "Starting extrusion failed");
                    self.notifier.error("Error on starting extrusion", e.server_message());
                    self.lock().extrude = ExtrudeState::Idle;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Abort a running test extrusion. Does nothing when none is running; a
    /// failure keeps the extrusion marked as running so stop can be retried.
    pub async fn stop_extrusion(&self) -> Result<Dispatch, CommandError> {
        let span = create_command_span("stop_extrusion", &self.plugin_id, &generate_correlation_id());
        async {
            if !self.extrusion_in_progress() {
                warn!("No extrusion in progress, stop request ignored");
                return Ok(Dispatch::Ignored);
            }

            info!("Stopping test extrusion");
            match self.printer.send_command(&PluginCommand::StopExtrusion).await {
                Ok(response) => {
                    debug!(%response, "eSteps_stopExtrusion response");
                    self.notifier.info(
                        "Extrusion stopped",
                        "The extrusion process has been successfully stopped.",
                    );
                    self.lock().extrude = ExtrudeState::Idle;
                    Ok(Dispatch::Sent)
                }
                Err(e) => {
                    error!(error = %e, "Stopping extrusion failed");
                    self.notifier.error("Error on stopping extrusion", e.server_message());
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Write the current computed value to the firmware. The value is sent
    /// as computed, sentinel included.
    pub async fn save_steps(&self) -> Result<NewSteps, CommandError> {
        let span = create_command_span("save_steps", &self.plugin_id, &generate_correlation_id());
        async {
            let new_steps = self.new_steps();
            info!(%new_steps, "Saving new E-steps value");

            let command = PluginCommand::SaveSteps { new_e_steps: new_steps };
            match self.printer.send_command(&command).await {
                Ok(_) => {
                    info!(%new_steps, "E-steps saved");
                    self.notifier.info(
                        "Saved",
                        &format!("{new_steps} steps/mm has been set for E steps"),
                    );
                    Ok(new_steps)
                }
                Err(e) => {
                    error!(error = %e, "Saving E-steps failed");
                    self.notifier.report_failure(&e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    // ---- events ----------------------------------------------------------

    /// Handle one pushed plugin message. Only this plugin's
    /// `extrusion_completed` state has an effect.
    pub fn on_plugin_message(&self, message: &PluginMessage) {
        handle_message(&self.state, &self.plugin_id, message);
    }
}

impl std::fmt::Debug for CalibrationWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibrationWorkflow")
            .field("plugin_id", &self.plugin_id)
            .field("rounding", &self.rounding)
            .field("state", &*self.lock())
            .finish()
    }
}

fn lock_state(state: &Mutex<WorkflowState>) -> MutexGuard<'_, WorkflowState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn compute_actual_extrusion(rounding: &Rounding, state: &WorkflowState) -> f64 {
    rounding.round(state.parameters.mark_length - state.remained_length)
}

fn compute_new_steps(rounding: &Rounding, state: &WorkflowState) -> NewSteps {
    if !state.steps_loaded {
        debug!("Steps not loaded, new steps not available");
        return NewSteps::NotAvailable;
    }
    let actual = compute_actual_extrusion(rounding, state);
    let e_steps = state.steps.e;
    if actual == 0.0 || e_steps == 0.0 {
        debug!(actual, e_steps, "Division by zero avoided, new steps not available");
        return NewSteps::NotAvailable;
    }
    NewSteps::Value(rounding.round(e_steps * state.parameters.extrude_length / actual))
}

fn apply_load_response(state: &mut WorkflowState, response: &serde_json::Value) {
    match response.get("data").filter(|data| !data.is_null()) {
        Some(data) => {
            state.steps = StepperAxes::from_response_data(data);
            // An all-zero answer means the firmware did not report anything usable
            state.steps_loaded = !state.steps.is_all_zero();
            if state.steps_loaded {
                info!(steps = %state.steps, "Steps loaded");
            } else {
                warn!("Step values are all zero, saving stays disabled");
            }
        }
        None => {
            warn!("No step data in response, resetting steps to zero");
            state.steps = StepperAxes::default();
            state.steps_loaded = false;
        }
    }
}

fn handle_message(state: &Mutex<WorkflowState>, plugin_id: &str, message: &PluginMessage) {
    if !message.is_from(plugin_id) {
        return;
    }
    if message.state() == Some(EXTRUSION_COMPLETED) {
        info!("Extrusion completed");
        lock_state(state).extrude = ExtrudeState::Idle;
    }
}

async fn listen(
    mut receiver: tokio::sync::broadcast::Receiver<PluginMessage>,
    state: Arc<Mutex<WorkflowState>>,
    plugin_id: String,
) {
    loop {
        match receiver.recv().await {
            Ok(message) => handle_message(&state, &plugin_id, &message),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Plugin message listener lagged behind");
            }
            Err(RecvError::Closed) => {
                debug!("Plugin message channel closed");
                break;
            }
        }
    }
}
