//! Production line
//!
//! One line owns its eight devices and two AGVs and runs the per-tick
//! routing: stations hand finished products to conveyors, conveyors
//! release downstream when there is room, the quality check stages
//! inspected products for AGV pickup, and the AGVs work through their
//! command queues. The P3 second-pass staging and the rework loop are
//! line-level routing rules, not device behavior.
//!
//! Intra-tick phase order (stable, so the KPI aggregator observes a
//! consistent view per tick): commands → order generator → fault
//! injector → stations → conveyors → quality → AGVs → usage reporting.

use crate::commands::{parse_command, CommandKind, CommandResponse};
use crate::devices::{
    Agv, AgvAction, AgvNotice, AgvOpError, Conveyor, DeviceCtx, FinishedGoods, HoldingConveyor,
    QualityChecker, QualityVerdict, QueuedTask, RawMaterial, Station,
};
use crate::faults::{FaultInjector, FaultOrder, FaultTarget};
use crate::kpi::KpiCalculator;
use crate::layout::{
    corridor_restriction, PathPoint, StationKind, SCRAP_COST_FACTOR, STATION_BUFFER_CAPACITY,
};
use crate::models::{
    AgvDestination, EventLog, FactoryEvent, Order, Product, QualityOutcome,
};
use crate::orders::OrderGenerator;
use crate::publisher::{AlertPayload, OrderItemPayload, OrderStatusPayload};
use crate::rng::RngManager;
use std::collections::HashMap;
use tracing::info;

/// Seconds between repeated buffer-full alerts for one device
const BUFFER_ALERT_DEBOUNCE: f64 = 5.0;

/// Everything a line produced during one tick that the engine must
/// publish or count
#[derive(Debug, Default)]
pub struct LineOutput {
    pub responses: Vec<CommandResponse>,
    pub order_events: Vec<OrderStatusPayload>,
    /// An agent asked for the scored result snapshot
    pub get_result_requested: bool,
    pub orders_created: u32,
    pub products_delivered: u32,
    pub products_scrapped: u32,
    pub faults_injected: u32,
    pub commands_processed: u32,
}

/// Mutable view of everything on a line except one AGV
///
/// Lets an AGV action interact with the rest of the line without
/// aliasing the AGV itself.
struct LineCore<'a> {
    raw: &'a mut RawMaterial,
    finished: &'a mut FinishedGoods,
    station_a: &'a mut Station,
    station_b: &'a mut Station,
    station_c: &'a mut Station,
    conveyor_ab: &'a mut Conveyor,
    conveyor_bc: &'a mut Conveyor,
    conveyor_cq: &'a mut HoldingConveyor,
    quality: &'a mut QualityChecker,
    orders: &'a mut Vec<Order>,
}

/// One of the three identical production lines
pub struct ProductionLine {
    name: String,
    raw: RawMaterial,
    finished: FinishedGoods,
    station_a: Station,
    station_b: Station,
    station_c: Station,
    conveyor_ab: Conveyor,
    conveyor_bc: Conveyor,
    conveyor_cq: HoldingConveyor,
    quality: QualityChecker,
    agv_1: Agv,
    agv_2: Agv,
    order_generator: OrderGenerator,
    fault_injector: FaultInjector,
    orders: Vec<Order>,
    scrapped: Vec<Product>,
    last_buffer_alert: HashMap<String, f64>,
}

impl ProductionLine {
    pub fn new(
        name: impl Into<String>,
        order_generator: OrderGenerator,
        fault_injector: FaultInjector,
    ) -> Self {
        Self {
            name: name.into(),
            raw: RawMaterial::new(),
            finished: FinishedGoods::new(),
            station_a: Station::new(StationKind::StationA),
            station_b: Station::new(StationKind::StationB),
            station_c: Station::new(StationKind::StationC),
            conveyor_ab: Conveyor::new("Conveyor_AB"),
            conveyor_bc: Conveyor::new("Conveyor_BC"),
            conveyor_cq: HoldingConveyor::new("Conveyor_CQ"),
            quality: QualityChecker::new(),
            agv_1: Agv::new("AGV_1", crate::layout::Corridor::Lower),
            agv_2: Agv::new("AGV_2", crate::layout::Corridor::Upper),
            order_generator,
            fault_injector,
            orders: Vec::new(),
            scrapped: Vec::new(),
            last_buffer_alert: HashMap::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw_material(&self) -> &RawMaterial {
        &self.raw
    }

    pub fn finished_goods(&self) -> &FinishedGoods {
        &self.finished
    }

    pub fn station(&self, kind: StationKind) -> &Station {
        match kind {
            StationKind::StationA => &self.station_a,
            StationKind::StationB => &self.station_b,
            StationKind::StationC => &self.station_c,
        }
    }

    pub fn station_mut(&mut self, kind: StationKind) -> &mut Station {
        match kind {
            StationKind::StationA => &mut self.station_a,
            StationKind::StationB => &mut self.station_b,
            StationKind::StationC => &mut self.station_c,
        }
    }

    pub fn conveyor_ab(&self) -> &Conveyor {
        &self.conveyor_ab
    }

    pub fn conveyor_bc(&self) -> &Conveyor {
        &self.conveyor_bc
    }

    pub fn conveyor_cq(&self) -> &HoldingConveyor {
        &self.conveyor_cq
    }

    pub fn quality(&self) -> &QualityChecker {
        &self.quality
    }

    pub fn quality_mut(&mut self) -> &mut QualityChecker {
        &mut self.quality
    }

    pub fn agv(&self, id: &str) -> Option<&Agv> {
        match id {
            "AGV_1" => Some(&self.agv_1),
            "AGV_2" => Some(&self.agv_2),
            _ => None,
        }
    }

    pub fn agv_mut(&mut self, id: &str) -> Option<&mut Agv> {
        match id {
            "AGV_1" => Some(&mut self.agv_1),
            "AGV_2" => Some(&mut self.agv_2),
            _ => None,
        }
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn orders_mut(&mut self) -> &mut Vec<Order> {
        &mut self.orders
    }

    pub fn scrapped(&self) -> &[Product] {
        &self.scrapped
    }

    /// Inject a product directly into the raw material warehouse
    /// (scenario tooling; the order generator is the normal source)
    pub fn seed_raw_product(&mut self, product: Product) {
        self.raw.store(product);
    }

    /// Every product currently anywhere on this line, including
    /// delivered and scrapped ones
    pub fn product_census(&self) -> usize {
        self.raw.len()
            + self.station_a.total_products()
            + self.station_b.total_products()
            + self.station_c.total_products()
            + self.conveyor_ab.len()
            + self.conveyor_bc.len()
            + self.conveyor_cq.total_products()
            + self.quality.total_products()
            + self.agv_1.payload().len()
            + self.agv_2.payload().len()
            + self.finished.len()
            + self.scrapped.len()
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance the line by one tick
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        now: f64,
        dt: f64,
        rng: &mut RngManager,
        kpi: &mut KpiCalculator,
        events: &mut EventLog,
        alerts: &mut Vec<AlertPayload>,
        inbound: Vec<String>,
    ) -> LineOutput {
        let mut out = LineOutput::default();

        self.handle_commands(now, events, inbound, &mut out);
        self.generate_orders(now, dt, rng, kpi, events, alerts, &mut out);
        self.inject_faults(now, dt, rng, kpi, events, alerts, &mut out);
        self.advance_production(now, dt, rng, kpi, events, alerts, &mut out);
        self.advance_agvs(now, dt, rng, kpi, events, alerts, &mut out);
        self.report_usage(now, dt, kpi);

        out
    }

    // ------------------------------------------------------------------------
    // Phase 1: agent commands
    // ------------------------------------------------------------------------

    fn handle_commands(
        &mut self,
        now: f64,
        events: &mut EventLog,
        inbound: Vec<String>,
        out: &mut LineOutput,
    ) {
        for json in inbound {
            out.commands_processed += 1;
            match parse_command(&json) {
                Err(err) => {
                    let command_id = command_id_of(&json);
                    events.log(FactoryEvent::CommandRejected {
                        time: now,
                        line: self.name.clone(),
                        command_id: command_id.clone(),
                        reason: err.to_string(),
                    });
                    out.responses.push(CommandResponse::new(
                        now,
                        command_id,
                        format!("Command rejected: {}", err),
                    ));
                }
                Ok(cmd) => match cmd.kind {
                    CommandKind::GetResult => {
                        events.log(FactoryEvent::CommandAccepted {
                            time: now,
                            line: self.name.clone(),
                            command_id: cmd.command_id.clone(),
                            action: "get_result".to_string(),
                            target: String::new(),
                        });
                        out.get_result_requested = true;
                        out.responses.push(CommandResponse::new(
                            now,
                            cmd.command_id,
                            "Result snapshot published",
                        ));
                    }
                    CommandKind::Agv { target, action } => {
                        let line_name = self.name.clone();
                        match self.agv_mut(&target) {
                        None => {
                            events.log(FactoryEvent::CommandRejected {
                                time: now,
                                line: line_name,
                                command_id: cmd.command_id.clone(),
                                reason: format!("unknown AGV '{}'", target),
                            });
                            out.responses.push(CommandResponse::new(
                                now,
                                cmd.command_id,
                                format!("Command rejected: unknown AGV '{}'", target),
                            ));
                        }
                        Some(agv) => {
                            events.log(FactoryEvent::CommandAccepted {
                                time: now,
                                line: line_name,
                                command_id: cmd.command_id.clone(),
                                action: action.name().to_string(),
                                target: target.clone(),
                            });
                            agv.enqueue_task(QueuedTask {
                                command_id: cmd.command_id,
                                action,
                            });
                        }
                    }
                    }
                },
            }
        }
    }

    // ------------------------------------------------------------------------
    // Phase 2: order generation
    // ------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn generate_orders(
        &mut self,
        now: f64,
        dt: f64,
        rng: &mut RngManager,
        kpi: &mut KpiCalculator,
        events: &mut EventLog,
        alerts: &mut Vec<AlertPayload>,
        out: &mut LineOutput,
    ) {
        let mut ctx = DeviceCtx {
            now,
            dt,
            line: &self.name,
            rng: &mut *rng,
            events: &mut *events,
            alerts: &mut *alerts,
        };
        if let Some(order) = self.order_generator.tick(&mut ctx, &mut self.raw) {
            kpi.register_order_created();
            for _ in 0..order.total_quantity() {
                kpi.register_product_created();
            }
            out.order_events.push(OrderStatusPayload::NewOrder {
                timestamp: now,
                order_id: order.id().to_string(),
                line: self.name.clone(),
                items: order
                    .items()
                    .iter()
                    .map(|item| OrderItemPayload {
                        product_type: item.product_type.to_string(),
                        quantity: item.quantity,
                    })
                    .collect(),
                priority: order.priority().to_string(),
                deadline: order.deadline(),
            });
            out.orders_created += 1;
            self.orders.push(order);
        }
    }

    // ------------------------------------------------------------------------
    // Phase 3: fault injection
    // ------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn inject_faults(
        &mut self,
        now: f64,
        dt: f64,
        rng: &mut RngManager,
        kpi: &mut KpiCalculator,
        events: &mut EventLog,
        alerts: &mut Vec<AlertPayload>,
        out: &mut LineOutput,
    ) {
        let order = {
            let mut ctx = DeviceCtx {
                now,
                dt,
                line: &self.name,
                rng: &mut *rng,
                events: &mut *events,
                alerts: &mut *alerts,
            };
            self.fault_injector.tick(&mut ctx)
        };
        let Some(FaultOrder { target, duration }) = order else {
            return;
        };
        self.apply_fault(target, duration, now, kpi, events, alerts, out);
    }

    /// Disable a device for `duration` seconds
    ///
    /// Used by the injector's periodic draws and by scenario tooling.
    /// A no-op when the device is already faulted.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_fault(
        &mut self,
        target: FaultTarget,
        duration: f64,
        now: f64,
        kpi: &mut KpiCalculator,
        events: &mut EventLog,
        alerts: &mut Vec<AlertPayload>,
        out: &mut LineOutput,
    ) {
        // A device can carry only one fault at a time.
        let already_faulted = match target {
            FaultTarget::StationA => self.station_a.is_faulted(),
            FaultTarget::StationB => self.station_b.is_faulted(),
            FaultTarget::StationC => self.station_c.is_faulted(),
            FaultTarget::QualityCheck => self.quality.is_faulted(),
            FaultTarget::ConveyorAB => self.conveyor_ab.is_faulted(),
            FaultTarget::ConveyorBC => self.conveyor_bc.is_faulted(),
            FaultTarget::Agv1 => self.agv_1.is_faulted(),
            FaultTarget::Agv2 => self.agv_2.is_faulted(),
        };
        if already_faulted {
            return;
        }

        let until = now + duration;
        let mut aborted_command = None;
        match target {
            FaultTarget::StationA => self.station_a.inject_fault(now, until),
            FaultTarget::StationB => self.station_b.inject_fault(now, until),
            FaultTarget::StationC => self.station_c.inject_fault(now, until),
            FaultTarget::QualityCheck => self.quality.inject_fault(now, until),
            FaultTarget::ConveyorAB => self.conveyor_ab.inject_fault(now, until),
            FaultTarget::ConveyorBC => self.conveyor_bc.inject_fault(now, until),
            FaultTarget::Agv1 => aborted_command = self.agv_1.inject_fault(until),
            FaultTarget::Agv2 => aborted_command = self.agv_2.inject_fault(until),
        }

        if let Some(command_id) = aborted_command {
            events.log(FactoryEvent::AgvTaskFailed {
                time: now,
                line: self.name.clone(),
                agv_id: target.device_id().to_string(),
                reason: "action aborted by fault".to_string(),
            });
            out.responses.push(CommandResponse::new(
                now,
                command_id,
                format!("{} action aborted: device fault", target.device_id()),
            ));
        }

        kpi.register_fault();
        alerts.push(AlertPayload::fault(
            now,
            &self.name,
            target.device_id(),
            target.symptom(),
            duration,
        ));
        events.log(FactoryEvent::FaultInjected {
            time: now,
            line: self.name.clone(),
            device_id: target.device_id().to_string(),
            symptom: target.symptom().to_string(),
            duration,
        });
        info!(
            line = %self.name,
            device = target.device_id(),
            duration,
            "fault injected"
        );
        out.faults_injected += 1;
    }

    // ------------------------------------------------------------------------
    // Phase 4: stations, conveyors, quality
    // ------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn advance_production(
        &mut self,
        now: f64,
        dt: f64,
        rng: &mut RngManager,
        kpi: &mut KpiCalculator,
        events: &mut EventLog,
        alerts: &mut Vec<AlertPayload>,
        out: &mut LineOutput,
    ) {
        {
            let mut ctx = DeviceCtx {
                now,
                dt,
                line: &self.name,
                rng: &mut *rng,
                events: &mut *events,
                alerts: &mut *alerts,
            };
            self.station_a.tick(&mut ctx);
            self.station_b.tick(&mut ctx);
            self.station_c.tick(&mut ctx);
        }

        // Station outputs feed the conveyors. Station C routes a
        // first-pass P3 into a holding buffer instead of the main belt.
        if self.station_a.is_ready_out()
            && !self.conveyor_ab.is_full()
            && !self.conveyor_ab.is_faulted()
        {
            if let Some(mut product) = self.station_a.take_output() {
                product.add_history(now, "Entered Conveyor_AB");
                if let Err(product) = self.conveyor_ab.try_push(product, now) {
                    self.station_a.restore_output(product);
                }
            }
        }
        if self.station_b.is_ready_out()
            && !self.conveyor_bc.is_full()
            && !self.conveyor_bc.is_faulted()
        {
            if let Some(mut product) = self.station_b.take_output() {
                product.add_history(now, "Entered Conveyor_BC");
                if let Err(product) = self.conveyor_bc.try_push(product, now) {
                    self.station_b.restore_output(product);
                }
            }
        }
        if self.station_c.is_ready_out() {
            if let Some(product) = self.station_c.take_output() {
                if product.awaiting_second_pass() {
                    match self.conveyor_cq.push_holding(product) {
                        Ok(side) => {
                            info!(
                                line = %self.name,
                                %side,
                                "first-pass P3 staged in holding buffer"
                            );
                        }
                        Err(product) => {
                            // Both holding buffers full: Station C blocks.
                            self.station_c.restore_output(product);
                            self.raise_buffer_alert(now, "Conveyor_CQ", alerts);
                        }
                    }
                } else if !self.conveyor_cq.main().is_full() && !self.conveyor_cq.main().is_faulted()
                {
                    let mut product = product;
                    product.add_history(now, "Entered Conveyor_CQ");
                    if let Err(product) = self.conveyor_cq.main_mut().try_push(product, now) {
                        self.station_c.restore_output(product);
                    }
                } else {
                    self.station_c.restore_output(product);
                }
            }
        }

        {
            let mut ctx = DeviceCtx {
                now,
                dt,
                line: &self.name,
                rng: &mut *rng,
                events: &mut *events,
                alerts: &mut *alerts,
            };
            self.conveyor_ab.tick(&mut ctx);
            self.conveyor_bc.tick(&mut ctx);
            self.conveyor_cq.main_mut().tick(&mut ctx);
        }

        // Conveyor releases: an item whose delay elapsed moves into the
        // downstream buffer when there is room; otherwise it stays and
        // the belt keeps exerting backpressure.
        Self::release_to_station(
            &mut self.conveyor_ab,
            &mut self.station_b,
            now,
            &self.name,
            alerts,
            &mut self.last_buffer_alert,
        );
        Self::release_to_station(
            &mut self.conveyor_bc,
            &mut self.station_c,
            now,
            &self.name,
            alerts,
            &mut self.last_buffer_alert,
        );

        // CQ main belt releases into the quality check input.
        if self.conveyor_cq.main().head_ready(now) {
            let quality_has_room = !self.quality.is_faulted()
                && self.quality.buffer_level() < crate::layout::QUALITY_BUFFER_CAPACITY;
            if quality_has_room {
                if let Some(mut product) = self.conveyor_cq.main_mut().pop_ready(now) {
                    product.add_history(now, "Entered QualityCheck buffer");
                    if let Err(product) = self.quality.try_enqueue(product) {
                        self.conveyor_cq.main_mut().restore_front(product, now);
                    }
                }
            } else if !self.quality.is_faulted() {
                let name = self.name.clone();
                Self::debounced_alert(
                    &mut self.last_buffer_alert,
                    now,
                    &name,
                    "QualityCheck",
                    alerts,
                );
            }
        }

        // Quality inspection.
        let verdict = {
            let mut ctx = DeviceCtx {
                now,
                dt,
                line: &self.name,
                rng: &mut *rng,
                events: &mut *events,
                alerts: &mut *alerts,
            };
            self.quality.tick(&mut ctx)
        };
        match verdict {
            Some(QualityVerdict::Passed { first_pass, .. }) => {
                kpi.register_quality_pass(first_pass);
            }
            Some(QualityVerdict::Rework { .. }) => {}
            Some(QualityVerdict::Scrapped { product }) => {
                let scrap_cost = product.product_type().material_cost() * SCRAP_COST_FACTOR;
                kpi.register_product_scrapped(scrap_cost);
                events.log(FactoryEvent::ProductScrapped {
                    time: now,
                    line: self.name.clone(),
                    product_id: product.id().to_string(),
                    scrap_cost,
                });
                out.products_scrapped += 1;
                self.scrapped.push(product);
            }
            None => {}
        }
    }

    fn release_to_station(
        conveyor: &mut Conveyor,
        station: &mut Station,
        now: f64,
        line: &str,
        alerts: &mut Vec<AlertPayload>,
        last_buffer_alert: &mut HashMap<String, f64>,
    ) {
        if !conveyor.head_ready(now) {
            return;
        }
        let station_has_room =
            !station.is_faulted() && station.buffer_level() < STATION_BUFFER_CAPACITY;
        if station_has_room {
            if let Some(mut product) = conveyor.pop_ready(now) {
                product.add_history(now, format!("Entered {} buffer", station.id()));
                if let Err(product) = station.try_enqueue(product) {
                    conveyor.restore_front(product, now);
                }
            }
        } else if !station.is_faulted() {
            Self::debounced_alert(last_buffer_alert, now, line, station.id(), alerts);
        }
    }

    fn raise_buffer_alert(&mut self, now: f64, device_id: &str, alerts: &mut Vec<AlertPayload>) {
        let name = self.name.clone();
        Self::debounced_alert(&mut self.last_buffer_alert, now, &name, device_id, alerts);
    }

    fn debounced_alert(
        last_buffer_alert: &mut HashMap<String, f64>,
        now: f64,
        line: &str,
        device_id: &str,
        alerts: &mut Vec<AlertPayload>,
    ) {
        let due = last_buffer_alert
            .get(device_id)
            .map_or(true, |t| now - t >= BUFFER_ALERT_DEBOUNCE);
        if due {
            last_buffer_alert.insert(device_id.to_string(), now);
            alerts.push(AlertPayload::buffer_full(now, line, device_id));
        }
    }

    // ------------------------------------------------------------------------
    // Phase 5: AGVs
    // ------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn advance_agvs(
        &mut self,
        now: f64,
        dt: f64,
        rng: &mut RngManager,
        kpi: &mut KpiCalculator,
        events: &mut EventLog,
        alerts: &mut Vec<AlertPayload>,
        out: &mut LineOutput,
    ) {
        for idx in 0..2 {
            let Self {
                name,
                raw,
                finished,
                station_a,
                station_b,
                station_c,
                conveyor_ab,
                conveyor_bc,
                conveyor_cq,
                quality,
                agv_1,
                agv_2,
                orders,
                ..
            } = self;
            let agv = if idx == 0 { agv_1 } else { agv_2 };
            let mut core = LineCore {
                raw,
                finished,
                station_a,
                station_b,
                station_c,
                conveyor_ab,
                conveyor_bc,
                conveyor_cq,
                quality,
                orders,
            };

            let notice = {
                let mut ctx = DeviceCtx {
                    now,
                    dt,
                    line: name,
                    rng: &mut *rng,
                    events: &mut *events,
                    alerts: &mut *alerts,
                };
                agv.tick(&mut ctx)
            };
            match notice {
                Some(AgvNotice::TaskCompleted {
                    command_id,
                    description,
                }) => {
                    events.log(FactoryEvent::AgvTaskCompleted {
                        time: now,
                        line: name.clone(),
                        agv_id: agv.id().to_string(),
                        description: description.clone(),
                    });
                    out.responses
                        .push(CommandResponse::new(now, command_id, description));
                }
                Some(AgvNotice::ChargeCompleted {
                    command_id, level, ..
                }) => {
                    out.responses.push(CommandResponse::new(
                        now,
                        command_id,
                        format!("{} charged to {:.1}%", agv.id(), level),
                    ));
                }
                None => {}
            }

            if let Some(task) = agv.pop_task() {
                let mut ctx = DeviceCtx {
                    now,
                    dt,
                    line: name,
                    rng: &mut *rng,
                    events: &mut *events,
                    alerts: &mut *alerts,
                };
                if let Some(response) =
                    Self::execute_task(agv, &mut core, task, &mut ctx, kpi, out)
                {
                    out.responses.push(response);
                }
            }
        }
    }

    /// Start a queued AGV action, applying the device-side transfer
    ///
    /// Returns a response only when the action resolves immediately
    /// (validation failure, forced charge, trivial charge); successful
    /// starts respond on completion.
    fn execute_task(
        agv: &mut Agv,
        core: &mut LineCore<'_>,
        task: QueuedTask,
        ctx: &mut DeviceCtx<'_>,
        kpi: &mut KpiCalculator,
        out: &mut LineOutput,
    ) -> Option<CommandResponse> {
        let now = ctx.now;
        let QueuedTask { command_id, action } = task;

        // The closure cannot borrow `agv` (it is mutated in every
        // branch); capture the id up front.
        let agv_id = agv.id().to_string();
        let fail = |command_id: Option<String>, reason: String, ctx: &mut DeviceCtx<'_>| {
            ctx.events.log(FactoryEvent::AgvTaskFailed {
                time: now,
                line: ctx.line.to_string(),
                agv_id: agv_id.clone(),
                reason: reason.clone(),
            });
            Some(CommandResponse::new(now, command_id, reason))
        };

        match action {
            AgvAction::Move { target } => match agv.start_move(command_id.clone(), target, now, ctx) {
                Ok(()) => None,
                Err(AgvOpError::ForcedCharge { battery }) => fail(
                    command_id,
                    format!(
                        "move to {} aborted: battery {:.1}% too low, forced charge engaged",
                        target, battery
                    ),
                    ctx,
                ),
                Err(err) => fail(command_id, format!("move to {} failed: {}", target, err), ctx),
            },
            AgvAction::Charge { target_level } => {
                match agv.start_charge(command_id.clone(), target_level, now, ctx) {
                    Ok(()) => None,
                    Err(AgvOpError::ChargeTargetReached { current, .. }) => {
                        Some(CommandResponse::new(
                            now,
                            command_id,
                            format!("battery already at {:.1}%, no charge needed", current),
                        ))
                    }
                    Err(err) => fail(command_id, format!("charge failed: {}", err), ctx),
                }
            }
            AgvAction::Load { product_id } => {
                if agv.payload_full() {
                    return fail(
                        command_id,
                        format!("load failed: payload full ({} products)", agv.payload().len()),
                        ctx,
                    );
                }
                let probe = AgvAction::Load {
                    product_id: product_id.clone(),
                };
                if agv.requires_forced_charge(&probe) {
                    let battery = agv.battery();
                    agv.begin_forced_charge(now, ctx);
                    return fail(
                        command_id,
                        format!(
                            "load aborted: battery {:.1}% too low, forced charge engaged",
                            battery
                        ),
                        ctx,
                    );
                }

                let picked = Self::pick_product(agv, core, product_id, now);
                match picked {
                    Err(reason) => fail(command_id, reason, ctx),
                    Ok((mut product, source)) => {
                        let material = product.charge_material();
                        if material > 0.0 {
                            kpi.register_material_cost(material);
                        }
                        product.add_history(
                            now,
                            format!("Loaded onto {} from {}", agv.id(), source),
                        );
                        let description =
                            format!("loaded {} from {}", product.id(), source);
                        agv.accept_product(product);
                        agv.start_action(command_id, description, now, ctx);
                        None
                    }
                }
            }
            AgvAction::Unload => {
                if agv.payload().is_empty() {
                    return fail(
                        command_id,
                        "unload failed: payload is empty".to_string(),
                        ctx,
                    );
                }
                if agv.requires_forced_charge(&AgvAction::Unload) {
                    let battery = agv.battery();
                    agv.begin_forced_charge(now, ctx);
                    return fail(
                        command_id,
                        format!(
                            "unload aborted: battery {:.1}% too low, forced charge engaged",
                            battery
                        ),
                        ctx,
                    );
                }

                match Self::drop_product(agv, core, now, ctx, kpi, out) {
                    Err(reason) => fail(command_id, reason, ctx),
                    Ok(description) => {
                        agv.start_action(command_id, description, now, ctx);
                        None
                    }
                }
            }
        }
    }

    /// Remove the product a load action targets from its source device
    ///
    /// Corridor compatibility is enforced here: a load at a device
    /// outside the AGV's corridor is rejected before any transfer.
    fn pick_product(
        agv: &Agv,
        core: &mut LineCore<'_>,
        product_id: Option<String>,
        now: f64,
    ) -> Result<(Product, &'static str), String> {
        let point = agv.current_point();
        if let Some(required) = corridor_restriction(point) {
            if agv.corridor() != required {
                return Err(format!(
                    "load failed: {} is serviced from the {} corridor, not by {}",
                    point,
                    required,
                    agv.id()
                ));
            }
        }
        match point {
            PathPoint::P0 => {
                let id = product_id
                    .ok_or_else(|| "load failed: product_id is required at RawMaterial".to_string())?;
                core.raw
                    .take(&id)
                    .map(|p| (p, "RawMaterial"))
                    .ok_or_else(|| format!("load failed: product {} not found at RawMaterial", id))
            }
            PathPoint::P1 => core
                .station_a
                .take_output()
                .map(|p| (p, "StationA"))
                .ok_or_else(|| "load failed: nothing staged at StationA".to_string()),
            PathPoint::P3 => core
                .station_b
                .take_output()
                .map(|p| (p, "StationB"))
                .ok_or_else(|| "load failed: nothing staged at StationB".to_string()),
            PathPoint::P5 => core
                .station_c
                .take_output()
                .map(|p| (p, "StationC"))
                .ok_or_else(|| "load failed: nothing staged at StationC".to_string()),
            PathPoint::P2 => core
                .conveyor_ab
                .pop_ready(now)
                .map(|p| (p, "Conveyor_AB"))
                .ok_or_else(|| "load failed: nothing ready on Conveyor_AB".to_string()),
            PathPoint::P4 => core
                .conveyor_bc
                .pop_ready(now)
                .map(|p| (p, "Conveyor_BC"))
                .ok_or_else(|| "load failed: nothing ready on Conveyor_BC".to_string()),
            PathPoint::P6 => core
                .conveyor_cq
                .pop_holding(agv.corridor())
                .map(|p| (p, "Conveyor_CQ holding"))
                .ok_or_else(|| {
                    format!(
                        "load failed: {} holding buffer of Conveyor_CQ is empty",
                        agv.corridor()
                    )
                }),
            PathPoint::P8 => core
                .quality
                .take_output()
                .map(|p| (p, "QualityCheck output"))
                .ok_or_else(|| "load failed: nothing staged at QualityCheck output".to_string()),
            point => Err(format!("load failed: nothing to pick up at {}", point)),
        }
    }

    /// Drop the head payload product into the device at the current
    /// point, enforcing the product's route and the corridor rule
    fn drop_product(
        agv: &mut Agv,
        core: &mut LineCore<'_>,
        now: f64,
        ctx: &mut DeviceCtx<'_>,
        kpi: &mut KpiCalculator,
        out: &mut LineOutput,
    ) -> Result<String, String> {
        let point = agv.current_point();
        if let Some(required) = corridor_restriction(point) {
            if agv.corridor() != required {
                return Err(format!(
                    "unload failed: {} is serviced from the {} corridor, not by {}",
                    point,
                    required,
                    agv.id()
                ));
            }
        }
        let Some(mut product) = agv.remove_product() else {
            return Err("unload failed: payload is empty".to_string());
        };
        let destination = product.agv_destination();

        let expected_point = match destination {
            AgvDestination::StationA => PathPoint::P1,
            AgvDestination::StationB => PathPoint::P3,
            AgvDestination::StationC => PathPoint::P5,
            AgvDestination::FinishedGoods => PathPoint::P9,
        };
        if point != expected_point {
            let reason = format!(
                "unload failed: {} is routed to {} ({}), not {}",
                product.id(),
                destination,
                expected_point,
                point
            );
            agv.return_product(product);
            return Err(reason);
        }

        match destination {
            AgvDestination::FinishedGoods => {
                debug_assert_eq!(product.quality_outcome(), Some(QualityOutcome::Passed));
                product.add_history(now, "Delivered to finished goods");
                let cycle_seconds = now - product.created_at();
                let ratio = cycle_seconds / product.product_type().theoretical_seconds();
                kpi.register_product_completed(ratio);
                ctx.events.log(FactoryEvent::ProductDelivered {
                    time: now,
                    line: ctx.line.to_string(),
                    product_id: product.id().to_string(),
                    cycle_seconds,
                });
                out.products_delivered += 1;

                if let Some(order) = core
                    .orders
                    .iter_mut()
                    .find(|o| o.id() == product.order_id())
                {
                    if order.record_delivery(now) {
                        let on_time = order.is_on_time().unwrap_or(false);
                        kpi.register_order_completed(on_time);
                        ctx.events.log(FactoryEvent::OrderCompleted {
                            time: now,
                            line: ctx.line.to_string(),
                            order_id: order.id().to_string(),
                            on_time,
                        });
                        out.order_events.push(OrderStatusPayload::OrderComplete {
                            timestamp: now,
                            order_id: order.id().to_string(),
                            line: ctx.line.to_string(),
                            on_time,
                        });
                    }
                }

                let description = format!("unloaded {} to Warehouse", product.id());
                core.finished.store(product);
                Ok(description)
            }
            AgvDestination::StationA | AgvDestination::StationB | AgvDestination::StationC => {
                let station = match destination {
                    AgvDestination::StationA => &mut *core.station_a,
                    AgvDestination::StationB => &mut *core.station_b,
                    _ => &mut *core.station_c,
                };
                let description =
                    format!("unloaded {} to {}", product.id(), station.id());
                product.add_history(now, format!("Unloaded to {}", station.id()));
                match station.try_enqueue(product) {
                    Ok(()) => Ok(description),
                    Err(product) => {
                        let reason = if station.is_faulted() {
                            format!("unload failed: {} is faulted", station.id())
                        } else {
                            ctx.alerts.push(AlertPayload::buffer_full(
                                now,
                                ctx.line,
                                station.id(),
                            ));
                            format!("unload failed: {} buffer is full", station.id())
                        };
                        agv.return_product(product);
                        Err(reason)
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Phase 6: usage reporting
    // ------------------------------------------------------------------------

    fn report_usage(&self, now: f64, dt: f64, kpi: &mut KpiCalculator) {
        let elapsed = now + dt;
        for (id, work) in [
            (self.station_a.id(), self.station_a.working_seconds()),
            (self.station_b.id(), self.station_b.working_seconds()),
            (self.station_c.id(), self.station_c.working_seconds()),
            (self.quality.id(), self.quality.working_seconds()),
            (self.conveyor_ab.id(), self.conveyor_ab.working_seconds()),
            (self.conveyor_bc.id(), self.conveyor_bc.working_seconds()),
            (
                self.conveyor_cq.id(),
                self.conveyor_cq.main().working_seconds(),
            ),
        ] {
            kpi.set_device_usage(&format!("{}/{}", self.name, id), work, elapsed);
        }

        for agv in [&self.agv_1, &self.agv_2] {
            kpi.set_agv_stats(
                &format!("{}/{}", self.name, agv.id()),
                agv.stats().clone(),
                elapsed,
            );
        }
    }
}

/// Best-effort command_id extraction from an arbitrary JSON payload
fn command_id_of(json: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(json)
        .ok()?
        .get("command_id")?
        .as_str()
        .map(String::from)
}
