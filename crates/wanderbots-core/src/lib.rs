//! Core types shared across the Wanderbots workspace.
//!
//! A [`World`] steps autonomous bots through a perception-decision loop:
//! ranged sensors are cast against obstacle polylines, visit history is read
//! back out of an exploration memory grid, and the combined signal vector is
//! handed to a pluggable [`BrainRunner`] whose two outputs drive a
//! differential-drive kinematic update. Everything here is synchronous and
//! single-threaded; given identical state, a tick is bit-reproducible.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use std::collections::VecDeque;
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;
use thiserror::Error;
use tracing::debug;

new_key_type! {
    /// Stable handle for bots backed by a generational slot map.
    pub struct BotId;
}

/// Angular twist applied to the sensor fan so its sweep faces the bot's
/// heading rather than the local x-axis.
pub const ANGLE_OFFSET: f64 = -FRAC_PI_2;

/// Input signal reported for a sensor that struck no obstacle this tick.
pub const NO_HIT: f64 = -1.0;

/// Axis-aligned 2D vector used for positions, headings, and ray endpoints.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    /// Construct a new vector.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Rotate around the origin by `angle` radians (counter-clockwise).
    #[must_use]
    pub fn rotated(self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

/// High level simulation clock (ticks processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// The two actuator outputs of a brain evaluation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackSpeeds {
    pub left: f64,
    pub right: f64,
}

impl TrackSpeeds {
    /// Construct a new pair of track speeds.
    #[must_use]
    pub const fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }
}

/// Errors raised by the exploration memory grid.
#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    /// Indicates configuration values that cannot be used.
    #[error("invalid grid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A queried position lies outside the world covered by the grid.
    #[error("position ({x}, {y}) is outside the world bounds")]
    OutOfBounds { x: f64, y: f64 },
}

/// Errors raised when assembling or mutating a world.
#[derive(Debug, Error, PartialEq)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// An obstacle polyline was supplied with fewer than two points.
    #[error("an obstacle polyline needs at least two points")]
    DegenerateObstacle,
    /// A grid operation failed while stepping a bot.
    #[error(transparent)]
    Grid(#[from] GridError),
    /// A brain's declared input arity does not match the sensor layout.
    #[error("brain consumes {brain_inputs} inputs but the sensor layout supplies {sensor_inputs}")]
    BrainArity {
        brain_inputs: usize,
        sensor_inputs: usize,
    },
    /// No bot is registered under the supplied handle.
    #[error("no bot registered under the supplied handle")]
    UnknownBot,
}

/// Fraction along segment `ab` at which it crosses segment `cd`, if the two
/// segments cross strictly inside both interiors.
///
/// `ab` is the sensor ray (bot center to sensor tip) and `cd` one edge of an
/// obstacle polyline. Endpoint-only contact, parallel and degenerate segments
/// all report no crossing. The interior test multiplies the parametric
/// numerators by their shared denominator instead of dividing, so a zero
/// denominator falls out without any special casing.
#[must_use]
pub fn segment_intersection(a: Vec2, b: Vec2, c: Vec2, d: Vec2) -> Option<f64> {
    if (a.y > d.y && b.y > d.y && a.y > c.y && b.y > c.y)
        || (b.y < c.y && a.y < c.y && b.y < d.y && a.y < d.y)
        || (a.x > d.x && b.x > d.x && a.x > c.x && b.x > c.x)
        || (b.x < c.x && a.x < c.x && b.x < d.x && a.x < d.x)
    {
        return None;
    }

    let r_top = (a.y - c.y) * (d.x - c.x) - (a.x - c.x) * (d.y - c.y);
    let r_bot = (b.x - a.x) * (d.y - c.y) - (b.y - a.y) * (d.x - c.x);
    let s_top = (a.y - c.y) * (b.x - a.x) - (a.x - c.x) * (b.y - a.y);
    let s_bot = r_bot;

    let r_cross = r_top * r_bot;
    let s_cross = s_top * s_bot;
    if r_cross > 0.0 && r_cross < r_bot * r_bot && s_cross > 0.0 && s_cross < s_bot * s_bot {
        Some(r_top / r_bot)
    } else {
        None
    }
}

/// A connected polyline the environment places in the world.
///
/// Not closed unless the caller repeats the first point. Static for the
/// lifetime of a run; bots only ever read it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Obstacle {
    points: Vec<Vec2>,
}

impl Obstacle {
    /// Build an obstacle from its ordered points.
    pub fn new(points: Vec<Vec2>) -> Result<Self, WorldError> {
        if points.len() < 2 {
            return Err(WorldError::DegenerateObstacle);
        }
        Ok(Self { points })
    }

    /// The ordered points of the polyline.
    #[must_use]
    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    /// Iterate over consecutive point pairs.
    pub fn edges(&self) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
        self.points.windows(2).map(|pair| (pair[0], pair[1]))
    }
}

/// Visit counters over a uniform grid covering the world bounds.
///
/// Each cell spans `cell_size × cell_size` world units and counts how many
/// ticks a bot has spent inside it. Counters only ever grow; normalization is
/// the caller's concern. Looking up a position outside the inclusive
/// `[0, width] × [0, height]` bounds is a caller bug and fails loudly rather
/// than clamping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExplorationGrid {
    width: f64,
    height: f64,
    cell_size: f64,
    cols: usize,
    rows: usize,
    ticks: Vec<i64>,
}

impl ExplorationGrid {
    /// Construct a grid covering `width × height` world units.
    pub fn new(width: f64, height: f64, cell_size: f64) -> Result<Self, GridError> {
        if !width.is_finite() || !height.is_finite() || !cell_size.is_finite() {
            return Err(GridError::InvalidConfig("grid dimensions must be finite"));
        }
        if width <= 0.0 || height <= 0.0 {
            return Err(GridError::InvalidConfig("grid dimensions must be positive"));
        }
        if cell_size <= 0.0 {
            return Err(GridError::InvalidConfig("cell_size must be positive"));
        }
        let cols = (width / cell_size).floor() as usize + 1;
        let rows = (height / cell_size).floor() as usize + 1;
        Ok(Self {
            width,
            height,
            cell_size,
            cols,
            rows,
            ticks: vec![0; cols * rows],
        })
    }

    /// Flat offset of the cell containing `(x, y)`.
    fn cell_offset(&self, x: f64, y: f64) -> Result<usize, GridError> {
        if !x.is_finite() || !y.is_finite() || x < 0.0 || x > self.width || y < 0.0 || y > self.height
        {
            return Err(GridError::OutOfBounds { x, y });
        }
        let col = (x / self.cell_size).floor() as usize;
        let row = (y / self.cell_size).floor() as usize;
        Ok(row * self.cols + col)
    }

    /// Record one tick of presence at `(x, y)`.
    pub fn update(&mut self, x: f64, y: f64) -> Result<(), GridError> {
        let offset = self.cell_offset(x, y)?;
        self.ticks[offset] += 1;
        Ok(())
    }

    /// Visit counter of the cell containing `(x, y)`.
    pub fn ticks_lingered(&self, x: f64, y: f64) -> Result<i64, GridError> {
        Ok(self.ticks[self.cell_offset(x, y)?])
    }

    /// Number of distinct cells visited since the last reset.
    #[must_use]
    pub fn cells_visited(&self) -> usize {
        self.ticks.iter().filter(|&&ticks| ticks > 0).count()
    }

    /// Zero every counter in place.
    pub fn reset(&mut self) {
        self.ticks.fill(0);
    }

    /// Cell columns covering the world width.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Cell rows covering the world height.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Edge length of one cell in world units.
    #[must_use]
    pub const fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Raw row-major visit counters, for read-only consumers.
    #[must_use]
    pub fn ticks(&self) -> &[i64] {
        &self.ticks
    }
}

/// Thin trait object used to drive brain evaluations without coupling the
/// core to concrete network implementations.
pub trait BrainRunner: Send + Sync {
    /// Static identifier of the brain implementation.
    fn kind(&self) -> &'static str;

    /// Number of input signals consumed per evaluation.
    fn input_arity(&self) -> usize;

    /// Evaluate track speeds for the provided input vector.
    fn drive(&mut self, inputs: &[f64]) -> TrackSpeeds;
}

/// Fixed fan of ray endpoints in the bot's local rest frame.
///
/// Sensors are created once and never mutated; every tick they are rotated by
/// the current heading and translated by the current position to produce
/// world-space ray tips. Sensor order is significant: it defines the index
/// used for network inputs and exploration readings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorFan {
    offsets: Vec<Vec2>,
    range: f64,
}

impl SensorFan {
    /// Fan `count` sensors evenly across a half circle of radius `range`.
    pub fn new(count: usize, range: f64) -> Result<Self, WorldError> {
        if count == 0 {
            return Err(WorldError::InvalidConfig("at least one sensor is required"));
        }
        if !range.is_finite() || range <= 0.0 {
            return Err(WorldError::InvalidConfig("sensor_range must be positive"));
        }
        let segment = if count > 1 { PI / (count - 1) as f64 } else { 0.0 };
        let offsets = (0..count)
            .map(|index| {
                let angle = index as f64 * segment + ANGLE_OFFSET;
                Vec2::new(-angle.sin() * range, angle.cos() * range)
            })
            .collect();
        Ok(Self { offsets, range })
    }

    /// Number of sensors in the fan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns true if the fan holds no sensors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Radial distance of every sensor from the bot's local origin.
    #[must_use]
    pub const fn range(&self) -> f64 {
        self.range
    }

    /// Local-frame sensor offsets, in fan order.
    #[must_use]
    pub fn offsets(&self) -> &[Vec2] {
        &self.offsets
    }

    /// Transform every sensor into world space for the given pose.
    ///
    /// The previous contents of `tips` are replaced.
    pub fn world_tips(&self, position: Vec2, direction: Vec2, tips: &mut Vec<Vec2>) {
        let swing = direction.y.atan2(direction.x) + ANGLE_OFFSET;
        tips.clear();
        tips.extend(self.offsets.iter().map(|offset| {
            let turned = offset.rotated(swing);
            Vec2::new(position.x + turned.x, position.y + turned.y)
        }));
    }
}

/// Per-sensor intersection depths for one tick.
///
/// A recorded depth is the fraction of the ray, bot center to sensor tip, at
/// which the nearest processed obstacle edge was struck. Recording is
/// first-writer-wins: once a sensor holds a depth, later edges and obstacles
/// cannot overwrite it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CollisionMap {
    depths: Vec<Option<f64>>,
    hits: usize,
}

impl CollisionMap {
    /// An empty map sized for `sensor_count` sensors.
    #[must_use]
    pub fn new(sensor_count: usize) -> Self {
        Self {
            depths: vec![None; sensor_count],
            hits: 0,
        }
    }

    /// Drop every recorded depth.
    pub fn clear(&mut self) {
        self.depths.fill(None);
        self.hits = 0;
    }

    /// Record a depth for `sensor` unless one is already present.
    pub fn record(&mut self, sensor: usize, depth: f64) {
        let slot = &mut self.depths[sensor];
        if slot.is_none() {
            *slot = Some(depth);
            self.hits += 1;
        }
    }

    /// Depth recorded for `sensor`, if any.
    #[must_use]
    pub fn depth(&self, sensor: usize) -> Option<f64> {
        self.depths.get(sensor).copied().flatten()
    }

    /// Smallest recorded depth across all sensors.
    #[must_use]
    pub fn nearest(&self) -> Option<f64> {
        self.depths
            .iter()
            .flatten()
            .copied()
            .map(OrderedFloat)
            .min()
            .map(OrderedFloat::into_inner)
    }

    /// Number of sensors with a recorded depth.
    #[must_use]
    pub const fn hits(&self) -> usize {
        self.hits
    }

    /// Whether every sensor already holds a depth.
    #[must_use]
    pub fn is_saturated(&self) -> bool {
        self.hits == self.depths.len()
    }

    /// Number of sensor slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.depths.len()
    }

    /// Returns true if the map tracks no sensors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.depths.is_empty()
    }

    /// Iterate over `(sensor index, depth)` pairs with a recorded hit.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.depths
            .iter()
            .enumerate()
            .filter_map(|(index, depth)| depth.map(|depth| (index, depth)))
    }
}

/// Static configuration for a Wanderbots world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WanderbotsConfig {
    /// Width of the world in world units.
    pub world_width: f64,
    /// Height of the world in world units.
    pub world_height: f64,
    /// Edge length of one exploration cell in world units.
    pub cell_size: f64,
    /// Number of ray sensors fanned across each bot's half circle.
    pub num_sensors: usize,
    /// Radial reach of every sensor from the bot center.
    pub sensor_range: f64,
    /// Per-tick cap on heading change, in radians.
    pub max_rotation: f64,
    /// Visit count at which an exploration reading crosses zero.
    pub max_tick: i64,
    /// Depth below which a sensor hit halts the bot for the tick.
    pub collision_stop_depth: f64,
    /// Maximum number of recent tick summaries retained in memory.
    pub history_capacity: usize,
}

impl Default for WanderbotsConfig {
    fn default() -> Self {
        Self {
            world_width: 800.0,
            world_height: 600.0,
            cell_size: 30.0,
            num_sensors: 10,
            sensor_range: 80.0,
            max_rotation: 0.2,
            max_tick: 255,
            collision_stop_depth: 0.1,
            history_capacity: 256,
        }
    }
}

impl WanderbotsConfig {
    /// Validates the configuration before any world state is built.
    fn validate(&self) -> Result<(), WorldError> {
        if !self.world_width.is_finite()
            || !self.world_height.is_finite()
            || self.world_width <= 0.0
            || self.world_height <= 0.0
        {
            return Err(WorldError::InvalidConfig(
                "world dimensions must be positive and finite",
            ));
        }
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(WorldError::InvalidConfig("cell_size must be positive"));
        }
        if self.num_sensors == 0 {
            return Err(WorldError::InvalidConfig("at least one sensor is required"));
        }
        if !self.sensor_range.is_finite() || self.sensor_range <= 0.0 {
            return Err(WorldError::InvalidConfig("sensor_range must be positive"));
        }
        if !self.max_rotation.is_finite() || self.max_rotation <= 0.0 {
            return Err(WorldError::InvalidConfig("max_rotation must be positive"));
        }
        if self.max_tick <= 0 {
            return Err(WorldError::InvalidConfig("max_tick must be positive"));
        }
        if !self.collision_stop_depth.is_finite()
            || self.collision_stop_depth <= 0.0
            || self.collision_stop_depth > 1.0
        {
            return Err(WorldError::InvalidConfig(
                "collision_stop_depth must be in (0, 1]",
            ));
        }
        if self.history_capacity == 0 {
            return Err(WorldError::InvalidConfig("history_capacity must be non-zero"));
        }
        Ok(())
    }
}

/// One autonomous agent: pose, sensors, exploration memory, and a replaceable
/// brain.
///
/// The per-tick trace (world-space sensor tips, collision map, collided flag)
/// stays readable between steps so presentation layers can draw the last
/// sweep without re-deriving it.
pub struct Bot {
    id: BotId,
    start: Vec2,
    position: Vec2,
    rotation: f64,
    direction: Vec2,
    tracks: TrackSpeeds,
    sensors: SensorFan,
    memory: ExplorationGrid,
    brain: Option<Box<dyn BrainRunner>>,
    tips: Vec<Vec2>,
    collisions: CollisionMap,
    collided: bool,
    inputs: Vec<f64>,
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("rotation", &self.rotation)
            .field("collided", &self.collided)
            .field("brain", &self.brain.as_ref().map(|brain| brain.kind()))
            .finish()
    }
}

impl Bot {
    fn new(config: &WanderbotsConfig, id: BotId, start: Vec2) -> Result<Self, WorldError> {
        let sensors = SensorFan::new(config.num_sensors, config.sensor_range)?;
        let memory =
            ExplorationGrid::new(config.world_width, config.world_height, config.cell_size)?;
        let count = sensors.len();
        Ok(Self {
            id,
            start,
            position: start,
            rotation: 0.0,
            direction: Self::rest_direction(0.0),
            tracks: TrackSpeeds::default(),
            sensors,
            memory,
            brain: None,
            tips: Vec::with_capacity(count),
            collisions: CollisionMap::new(count),
            collided: false,
            inputs: Vec::with_capacity(2 * count + 1),
        })
    }

    // Spawn-frame heading; `step` switches to the unit-circle convention once
    // the first tick runs.
    fn rest_direction(rotation: f64) -> Vec2 {
        Vec2::new(-rotation.sin(), rotation.cos())
    }

    /// Handle this bot was spawned under.
    #[must_use]
    pub const fn id(&self) -> BotId {
        self.id
    }

    /// Coordinate the bot starts from and returns to on reset.
    #[must_use]
    pub const fn start(&self) -> Vec2 {
        self.start
    }

    /// Current world position.
    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    /// Accumulated heading in radians; deliberately not wrapped.
    #[must_use]
    pub const fn rotation(&self) -> f64 {
        self.rotation
    }

    /// Unit vector along the current heading.
    #[must_use]
    pub const fn direction(&self) -> Vec2 {
        self.direction
    }

    /// Track speeds applied on the most recent step.
    #[must_use]
    pub const fn tracks(&self) -> TrackSpeeds {
        self.tracks
    }

    /// The bot's sensor layout.
    #[must_use]
    pub const fn sensors(&self) -> &SensorFan {
        &self.sensors
    }

    /// World-space sensor tips from the most recent step.
    #[must_use]
    pub fn sensor_tips(&self) -> &[Vec2] {
        &self.tips
    }

    /// Per-sensor intersection depths from the most recent step.
    #[must_use]
    pub const fn collisions(&self) -> &CollisionMap {
        &self.collisions
    }

    /// Whether the most recent step halted on a close obstacle.
    #[must_use]
    pub const fn is_collided(&self) -> bool {
        self.collided
    }

    /// The exploration memory this bot writes every tick.
    #[must_use]
    pub const fn memory(&self) -> &ExplorationGrid {
        &self.memory
    }

    /// Fitness proxy: distinct cells visited since the last reset.
    #[must_use]
    pub fn cells_visited(&self) -> usize {
        self.memory.cells_visited()
    }

    /// Identifier of the attached brain, if one is bound.
    #[must_use]
    pub fn brain_kind(&self) -> Option<&str> {
        self.brain.as_deref().map(BrainRunner::kind)
    }

    /// Number of input signals the bot assembles per tick.
    #[must_use]
    pub fn input_len(&self) -> usize {
        2 * self.sensors.len() + 1
    }

    /// Replace the bot's brain between ticks.
    ///
    /// The swap is a single assignment: no tick ever observes a half-replaced
    /// network. Fails if the runner's declared arity does not match the
    /// sensor layout.
    pub fn set_brain(&mut self, brain: Box<dyn BrainRunner>) -> Result<(), WorldError> {
        let sensor_inputs = self.input_len();
        let brain_inputs = brain.input_arity();
        if brain_inputs != sensor_inputs {
            return Err(WorldError::BrainArity {
                brain_inputs,
                sensor_inputs,
            });
        }
        debug!(id = ?self.id, kind = brain.kind(), "brain attached");
        self.brain = Some(brain);
        Ok(())
    }

    /// Run one full perception-decision-actuation pass.
    ///
    /// Obstacles are scanned in exactly the order supplied. A sensor tip
    /// outside the world bounds surfaces the grid's domain error and leaves
    /// the bot's pose untouched.
    pub fn step(
        &mut self,
        config: &WanderbotsConfig,
        obstacles: &[Obstacle],
    ) -> Result<(), GridError> {
        self.sensors
            .world_tips(self.position, self.direction, &mut self.tips);
        self.scan_obstacles(obstacles);
        self.collided = self
            .collisions
            .nearest()
            .is_some_and(|depth| depth < config.collision_stop_depth);
        self.assemble_inputs(config.max_tick)?;

        let tracks = match self.brain.as_mut() {
            Some(brain) => brain.drive(&self.inputs),
            // An unbound bot coasts in place; perception and memory still run.
            None => TrackSpeeds::default(),
        };
        self.tracks = tracks;

        let turn = (tracks.left - tracks.right).clamp(-config.max_rotation, config.max_rotation);
        self.rotation += turn;
        self.direction = Vec2::new(self.rotation.cos(), self.rotation.sin());

        self.memory.update(self.position.x, self.position.y)?;

        if !self.collided {
            let speed = tracks.left + tracks.right;
            self.position = Vec2::new(
                (self.position.x + self.direction.x * speed).clamp(0.0, config.world_width),
                (self.position.y + self.direction.y * speed).clamp(0.0, config.world_height),
            );
        }
        Ok(())
    }

    fn scan_obstacles(&mut self, obstacles: &[Obstacle]) {
        self.collisions.clear();
        'scan: for obstacle in obstacles {
            for (from, to) in obstacle.edges() {
                for (index, tip) in self.tips.iter().enumerate() {
                    if self.collisions.depth(index).is_some() {
                        continue;
                    }
                    if let Some(depth) = segment_intersection(self.position, *tip, from, to) {
                        self.collisions.record(index, depth);
                    }
                }
                if self.collisions.is_saturated() {
                    break 'scan;
                }
            }
        }
    }

    /// Interleave `(depth, exploration reading)` pairs in sensor order, then
    /// append the collided flag.
    fn assemble_inputs(&mut self, max_tick: i64) -> Result<(), GridError> {
        self.inputs.clear();
        for (index, tip) in self.tips.iter().enumerate() {
            let depth = self.collisions.depth(index).unwrap_or(NO_HIT);
            let ticks = self.memory.ticks_lingered(tip.x, tip.y)?;
            let reading = (ticks - max_tick) as f64 / max_tick as f64;
            self.inputs.push(depth);
            self.inputs.push(reading);
        }
        self.inputs.push(if self.collided { 1.0 } else { 0.0 });
        Ok(())
    }

    /// Return to the start pose and forget all exploration history.
    ///
    /// The attached brain is kept; generation rollovers swap it separately
    /// via [`Bot::set_brain`].
    pub fn reset(&mut self) {
        self.position = self.start;
        self.rotation = 0.0;
        self.direction = Self::rest_direction(self.rotation);
        self.tracks = TrackSpeeds::default();
        self.tips.clear();
        self.collisions.clear();
        self.collided = false;
        self.memory.reset();
    }
}

/// Aggregate counters emitted after each world step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: Tick,
    pub bots: usize,
    pub collided: usize,
    pub cells_visited: usize,
}

/// Fitness read-out for one bot at a generation boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FitnessEntry {
    pub bot: BotId,
    pub cells_visited: usize,
}

/// Aggregate world state: configuration, obstacles, and every bot.
///
/// Bots are stepped sequentially in spawn order and never read each other's
/// state, so a tick needs no synchronization of any kind.
pub struct World {
    config: WanderbotsConfig,
    tick: Tick,
    obstacles: Vec<Obstacle>,
    bots: SlotMap<BotId, Bot>,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("obstacle_count", &self.obstacles.len())
            .field("bot_count", &self.bots.len())
            .finish()
    }
}

impl World {
    /// Instantiate a new world using the supplied configuration.
    pub fn new(config: WanderbotsConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let history = VecDeque::with_capacity(config.history_capacity);
        Ok(Self {
            config,
            tick: Tick::zero(),
            obstacles: Vec::new(),
            bots: SlotMap::with_key(),
            history,
        })
    }

    /// Add an obstacle polyline to the environment.
    pub fn add_obstacle(&mut self, points: Vec<Vec2>) -> Result<(), WorldError> {
        self.obstacles.push(Obstacle::new(points)?);
        Ok(())
    }

    /// Spawn a bot at `start`, returning its handle.
    ///
    /// The bot owns a fresh exploration grid covering the world bounds.
    pub fn spawn_bot(&mut self, start: Vec2) -> Result<BotId, WorldError> {
        if !start.x.is_finite()
            || !start.y.is_finite()
            || start.x < 0.0
            || start.x > self.config.world_width
            || start.y < 0.0
            || start.y > self.config.world_height
        {
            return Err(GridError::OutOfBounds {
                x: start.x,
                y: start.y,
            }
            .into());
        }
        let config = &self.config;
        let id = self
            .bots
            .try_insert_with_key(|id| Bot::new(config, id, start))?;
        debug!(?id, x = start.x, y = start.y, "bot spawned");
        Ok(id)
    }

    /// Step every bot once and record a summary.
    ///
    /// Aborts on the first domain error; the caller decides whether to stop
    /// the run or discard the offending agent.
    pub fn step(&mut self) -> Result<TickSummary, WorldError> {
        let config = &self.config;
        let obstacles = &self.obstacles;
        for bot in self.bots.values_mut() {
            bot.step(config, obstacles)?;
        }
        self.tick = self.tick.next();
        let summary = TickSummary {
            tick: self.tick,
            bots: self.bots.len(),
            collided: self.bots.values().filter(|bot| bot.is_collided()).count(),
            cells_visited: self.bots.values().map(Bot::cells_visited).sum(),
        };
        if self.history.len() == self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
        Ok(summary)
    }

    /// Replace the brain of one bot between ticks.
    pub fn set_brain(&mut self, id: BotId, brain: Box<dyn BrainRunner>) -> Result<(), WorldError> {
        self.bots
            .get_mut(id)
            .ok_or(WorldError::UnknownBot)?
            .set_brain(brain)
    }

    /// Reset one bot to its start pose with cleared exploration memory.
    pub fn reset_bot(&mut self, id: BotId) -> Result<(), WorldError> {
        self.bots.get_mut(id).ok_or(WorldError::UnknownBot)?.reset();
        Ok(())
    }

    /// Reset every bot and the tick counter for a new generation.
    pub fn reset_generation(&mut self) {
        for bot in self.bots.values_mut() {
            bot.reset();
        }
        self.tick = Tick::zero();
        debug!(bots = self.bots.len(), "generation reset");
    }

    /// Per-bot fitness read-out for the evolutionary collaborator.
    #[must_use]
    pub fn fitness_report(&self) -> Vec<FitnessEntry> {
        self.bots
            .iter()
            .map(|(id, bot)| FitnessEntry {
                bot: id,
                cells_visited: bot.cells_visited(),
            })
            .collect()
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub const fn config(&self) -> &WanderbotsConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// The environment's obstacle set, in processing order.
    #[must_use]
    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Borrow one bot for reading.
    #[must_use]
    pub fn bot(&self, id: BotId) -> Option<&Bot> {
        self.bots.get(id)
    }

    /// Iterate over every bot with its handle.
    pub fn bots(&self) -> impl Iterator<Item = (BotId, &Bot)> {
        self.bots.iter()
    }

    /// Number of live bots.
    #[must_use]
    pub fn bot_count(&self) -> usize {
        self.bots.len()
    }

    /// Iterate over retained tick summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }
}
