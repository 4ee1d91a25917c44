use lumen_core::math::{LinearRgba, Mat4, Vec3};
use lumen_core::renderer::api::{
    BindGroupId, BufferId, DeviceCapabilities, FrameFence, FrontFace, IndexFormat, LoadOp,
    ProgramId, RenderStats, RendererConfig, TextureViewId,
};
use lumen_core::renderer::{
    CameraView, Drawable, DrawableId, GpuGeometry, GraphicsDevice, Light, LightId,
    MaterialBinding, MeshDrawable, Viewport,
};
use lumen_infra::{HeadlessDevice, RecordedCommand};
use lumen_lanes::render_lane::{
    CullVisitor, FogMode, FogSettings, ForwardLane, FrameContext, PassState, PassTargets,
    PoolContext, QueueSource, RenderLane, RenderOutcome, RenderQueue, SceneCuller, ShadowLane,
    UniformBufferPool,
};
use lumen_lanes::LaneError;

const COLOR_VIEW: TextureViewId = TextureViewId(900);
const DEPTH_VIEW: TextureViewId = TextureViewId(901);

fn camera() -> CameraView {
    CameraView::perspective(
        Vec3::new(0.0, 1.0, 5.0),
        Vec3::ZERO,
        Vec3::Y,
        60f32.to_radians(),
        Viewport::new(1280.0, 720.0),
        0.1,
        100.0,
    )
}

fn mesh(id: u64, program: usize, world: Mat4) -> MeshDrawable {
    MeshDrawable::new(
        DrawableId(id),
        GpuGeometry {
            vertex_buffer: BufferId(100),
            index_buffer: Some((BufferId(101), IndexFormat::Uint16)),
            element_count: 36,
        },
        MaterialBinding {
            program: ProgramId(program),
            bind_group: BindGroupId(200 + program),
        },
        world,
    )
}

fn cube(id: u64, x: f32) -> Drawable {
    mesh(id, 1, Mat4::from_translation(Vec3::new(x, 0.0, 0.0))).into()
}

fn mirrored_cube(id: u64) -> Drawable {
    mesh(id, 2, Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0))).into()
}

fn targets() -> PassTargets {
    PassTargets {
        color: Some(COLOR_VIEW),
        depth: Some(DEPTH_VIEW),
        stencil: true,
    }
}

/// Pipeline and winding active at each draw call.
fn draws(commands: &[RecordedCommand]) -> Vec<(ProgramId, FrontFace)> {
    let mut pipeline = None;
    let mut winding = FrontFace::default();
    let mut out = Vec::new();
    for command in commands {
        match command {
            RecordedCommand::SetPipeline(program) => pipeline = Some(*program),
            RecordedCommand::SetFrontFace(front_face) => winding = *front_face,
            RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. } => {
                out.push((pipeline.expect("draw without pipeline"), winding));
            }
            _ => {}
        }
    }
    out
}

/// Winding left on the encoder once every command has run.
fn final_winding(commands: &[RecordedCommand]) -> FrontFace {
    commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::SetFrontFace(front_face) => Some(*front_face),
            _ => None,
        })
        .last()
        .unwrap_or_default()
}

struct Harness {
    device: HeadlessDevice,
    fence: FrameFence,
    pool: UniformBufferPool,
    stats: RenderStats,
}

impl Harness {
    fn new(device: HeadlessDevice) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let pool = UniformBufferPool::new(&device, &RendererConfig::default()).unwrap();
        let mut fence = FrameFence::default();
        fence.begin_frame().unwrap();
        Self {
            device,
            fence,
            pool,
            stats: RenderStats::default(),
        }
    }

    fn with_pool_floats(device: HeadlessDevice, floats: usize) -> Self {
        let mut harness = Self::new(device);
        harness.pool = UniformBufferPool::with_capacity_floats(&harness.device, floats).unwrap();
        harness
    }

    fn queue(&mut self, drawables: &[Drawable]) -> RenderQueue {
        let mut queue = RenderQueue::new();
        let mut ctx = PoolContext {
            device: &self.device,
            fence: &self.fence,
            pool: &mut self.pool,
        };
        for drawable in drawables {
            queue.push(&mut ctx, &camera(), drawable, 0).unwrap();
        }
        queue
    }

    /// Renders one lane into a fresh encoder and returns what was submitted.
    fn render(
        &mut self,
        lane: &mut dyn RenderLane,
        camera: Option<&CameraView>,
        source: QueueSource<'_>,
    ) -> (Result<RenderOutcome, LaneError>, Vec<RecordedCommand>) {
        let mut encoder = self.device.create_command_encoder(Some("Test Frame"));
        let result = {
            let mut frame = FrameContext {
                device: &self.device,
                encoder: &mut *encoder,
                fence: &self.fence,
                pool: &mut self.pool,
                stats: &mut self.stats,
            };
            lane.render(&mut frame, camera, source)
        };
        let command_buffer = encoder.finish();
        self.device.submit_command_buffer(command_buffer);
        let mut submitted = self.device.take_submitted_commands();
        assert_eq!(submitted.len(), 1);
        (result, submitted.remove(0))
    }
}

#[test]
fn precomputed_queues_draw_without_a_camera() {
    let mut harness = Harness::new(HeadlessDevice::new());
    let mut lane = ForwardLane::new(&harness.device, &RendererConfig::default(), targets()).unwrap();
    let mut queue = harness.queue(&[cube(1, 0.0)]);
    queue.push_light(&mut Light::point(LightId(1), 5.0));

    let (result, commands) = harness.render(&mut lane, None, QueueSource::Precomputed(&mut queue));

    assert_eq!(result.unwrap().draw_calls, 1);
    assert_eq!(harness.stats.clustered_lights, 0);
    assert!(matches!(
        commands.first(),
        Some(RecordedCommand::BeginRenderPass { .. })
    ));
    assert!(!commands
        .iter()
        .any(|command| matches!(command, RecordedCommand::BeginComputePass { .. })));
    assert_eq!(draws(&commands), vec![(ProgramId(1), FrontFace::Ccw)]);
}

#[test]
fn culling_without_a_camera_only_clears_the_targets() {
    let mut harness = Harness::new(HeadlessDevice::new());
    let mut lane = ForwardLane::new(&harness.device, &RendererConfig::default(), targets()).unwrap();
    let mut culler = ListCuller {
        drawables: vec![cube(1, 0.0)],
        lights: Vec::new(),
        calls: 0,
    };

    let (result, commands) = harness.render(&mut lane, None, QueueSource::Cull(&mut culler));

    assert!(matches!(
        result,
        Err(LaneError::MissingCamera {
            lane: "ForwardLane"
        })
    ));
    assert_eq!(culler.calls, 0);
    assert_eq!(
        commands,
        vec![
            RecordedCommand::BeginRenderPass {
                label: Some("ForwardLane".to_string()),
                color_targets: vec![COLOR_VIEW],
                color_loads: vec![LoadOp::Clear(LinearRgba::BLACK)],
                depth_load: Some(LoadOp::Clear(1.0)),
                stencil_load: Some(LoadOp::Clear(0)),
            },
            RecordedCommand::EndRenderPass,
        ]
    );
    assert_eq!(harness.stats.draw_calls, 0);
}

#[test]
fn forward_lane_draws_batches_and_restores_winding() {
    let mut harness = Harness::new(HeadlessDevice::new());
    let mut lane = ForwardLane::new(&harness.device, &RendererConfig::default(), targets()).unwrap();
    let mut queue = harness.queue(&[
        cube(1, -1.0),
        cube(2, 0.0),
        mirrored_cube(3),
        cube(4, 1.0),
        cube(5, 2.0),
    ]);

    let (result, commands) =
        harness.render(&mut lane, Some(&camera()), QueueSource::Precomputed(&mut queue));

    let outcome = result.unwrap();
    assert_eq!(
        outcome,
        RenderOutcome {
            items: 2,
            draw_calls: 2,
            instances: 5,
        }
    );
    assert_eq!(harness.stats.instanced_draw_calls, 2);
    assert_eq!(harness.stats.pooled_buffers_created, 2);
    assert_eq!(lane.core().state(), PassState::Active);

    let mut recorded = draws(&commands);
    recorded.sort_by_key(|(program, _)| program.0);
    assert_eq!(
        recorded,
        vec![(ProgramId(1), FrontFace::Ccw), (ProgramId(2), FrontFace::Cw)]
    );
    assert_eq!(final_winding(&commands), FrontFace::Ccw);
    // No lights: the cluster index is cleared ahead of the pass.
    assert!(matches!(commands[0], RecordedCommand::ClearTexture(_)));
    assert!(matches!(commands[1], RecordedCommand::BeginRenderPass { .. }));
    assert!(matches!(
        commands[2],
        RecordedCommand::SetBindGroup { index: 0, .. }
    ));
    assert_eq!(commands.last(), Some(&RecordedCommand::EndRenderPass));
}

fn lane_bind_group(commands: &[RecordedCommand]) -> BindGroupId {
    commands
        .iter()
        .find_map(|command| match command {
            RecordedCommand::SetBindGroup {
                index: 0,
                bind_group,
            } => Some(*bind_group),
            _ => None,
        })
        .expect("global bind group was never set")
}

#[test]
fn flipped_output_reverses_every_draw() {
    let device = HeadlessDevice::with_capabilities(DeviceCapabilities::limited());
    let mut harness = Harness::new(device);
    let mut lane = ForwardLane::new(&harness.device, &RendererConfig::default(), targets()).unwrap();
    assert!(lane.core().flip_output);
    let mut queue = harness.queue(&[cube(1, 0.0), mirrored_cube(2)]);

    let (result, commands) =
        harness.render(&mut lane, Some(&camera()), QueueSource::Precomputed(&mut queue));
    result.unwrap();

    let mut recorded = draws(&commands);
    recorded.sort_by_key(|(program, _)| program.0);
    assert_eq!(
        recorded,
        vec![(ProgramId(1), FrontFace::Cw), (ProgramId(2), FrontFace::Ccw)]
    );
    assert_eq!(final_winding(&commands), FrontFace::Ccw);
}

#[test]
fn global_bind_groups_are_cached_per_feature_set() {
    let mut harness = Harness::new(HeadlessDevice::new());
    let mut lane = ForwardLane::new(&harness.device, &RendererConfig::default(), targets()).unwrap();
    let camera = camera();

    let render = |harness: &mut Harness, lane: &mut ForwardLane| {
        let mut queue = harness.queue(&[cube(1, 0.0)]);
        let (result, commands) =
            harness.render(lane, Some(&camera), QueueSource::Precomputed(&mut queue));
        result.unwrap();
        lane_bind_group(&commands)
    };

    let first = render(&mut harness, &mut lane);
    let second = render(&mut harness, &mut lane);
    assert_eq!(first, second);
    assert_eq!(harness.stats.bind_group_cache_misses, 1);
    assert_eq!(harness.stats.bind_group_cache_hits, 1);

    harness.device.invalidate_bind_groups();
    let rebuilt = render(&mut harness, &mut lane);
    assert_ne!(rebuilt, first);
    assert_eq!(harness.stats.bind_group_cache_reloads, 1);
    assert_eq!(lane.core().bind_groups().len(), 1);

    lane.set_fog(FogSettings {
        mode: FogMode::Exponential,
        ..FogSettings::default()
    });
    let foggy = render(&mut harness, &mut lane);
    assert_ne!(foggy, rebuilt);
    assert_eq!(harness.stats.bind_group_cache_misses, 2);
    assert_eq!(lane.core().bind_groups().len(), 2);
}

struct ListCuller {
    drawables: Vec<Drawable>,
    lights: Vec<Light>,
    calls: usize,
}

impl SceneCuller for ListCuller {
    fn cull(
        &mut self,
        _camera: &CameraView,
        visitor: &mut CullVisitor<'_, '_>,
    ) -> anyhow::Result<()> {
        self.calls += 1;
        for drawable in &self.drawables {
            visitor.push_drawable(drawable, 0)?;
        }
        for light in &mut self.lights {
            visitor.push_light(light);
        }
        Ok(())
    }
}

#[test]
fn culled_scenes_are_queued_and_lit() {
    let mut harness = Harness::new(HeadlessDevice::new());
    let mut lane = ForwardLane::new(&harness.device, &RendererConfig::default(), targets()).unwrap();
    let mut culler = ListCuller {
        drawables: vec![cube(1, 0.0), cube(2, 1.0), mirrored_cube(3)],
        lights: vec![
            Light::point(LightId(1), 5.0),
            Light::point(LightId(2), 5.0),
            Light::directional(LightId(3)).with_shadows(true),
        ],
        calls: 0,
    };

    let (result, commands) =
        harness.render(&mut lane, Some(&camera()), QueueSource::Cull(&mut culler));
    let outcome = result.unwrap();

    assert_eq!(culler.calls, 1);
    assert_eq!(outcome.items, 2);
    assert_eq!(outcome.instances, 3);
    assert_eq!(harness.stats.clustered_lights, 2);
    let metrics = lane.cluster_metrics().copied().unwrap();
    assert_eq!(metrics.clustered_lights, 2);
    assert_eq!(metrics.dispatched_cells, 16 * 16 * 32);

    // The culling dispatch is recorded before the lit pass begins.
    let dispatch = commands
        .iter()
        .position(|c| matches!(c, RecordedCommand::DispatchWorkgroups { x: 16, y: 16, z: 32 }))
        .unwrap();
    let lit_pass = commands
        .iter()
        .position(|c| matches!(c, RecordedCommand::BeginRenderPass { .. }))
        .unwrap();
    assert!(dispatch < lit_pass);
    assert_eq!(commands[dispatch + 1], RecordedCommand::EndComputePass);

    // The scratch queue is emptied between renders.
    let (result, _) = harness.render(&mut lane, Some(&camera()), QueueSource::Cull(&mut culler));
    assert_eq!(result.unwrap().items, 2);
}

#[test]
fn limited_devices_cull_with_one_point_per_cell() {
    let device = HeadlessDevice::with_capabilities(DeviceCapabilities::limited());
    let mut harness = Harness::new(device);
    let mut lane = ForwardLane::new(&harness.device, &RendererConfig::default(), targets()).unwrap();
    let mut culler = ListCuller {
        drawables: vec![cube(1, 0.0)],
        lights: vec![Light::point(LightId(1), 5.0)],
        calls: 0,
    };

    let (result, commands) =
        harness.render(&mut lane, Some(&camera()), QueueSource::Cull(&mut culler));
    result.unwrap();

    let index_view = lane.cluster_grid().map(|grid| grid.view()).unwrap();
    assert_eq!(
        commands[0],
        RecordedCommand::BeginRenderPass {
            label: Some("Cluster Culling".to_string()),
            color_targets: vec![index_view],
            color_loads: vec![LoadOp::Clear(LinearRgba::TRANSPARENT)],
            depth_load: None,
            stencil_load: None,
        }
    );
    assert!(matches!(commands[1], RecordedCommand::SetPipeline(_)));
    assert!(matches!(
        commands[2],
        RecordedCommand::SetBindGroup { index: 0, .. }
    ));
    assert_eq!(
        commands[3],
        RecordedCommand::Draw {
            vertices: 0..16 * 16 * 32,
            instances: 0..1,
        }
    );
    assert_eq!(commands[4], RecordedCommand::EndRenderPass);
    assert!(!commands
        .iter()
        .any(|command| matches!(command, RecordedCommand::DispatchWorkgroups { .. })));
}

#[test]
fn culler_failures_are_reported() {
    struct Locked;
    impl SceneCuller for Locked {
        fn cull(&mut self, _: &CameraView, _: &mut CullVisitor<'_, '_>) -> anyhow::Result<()> {
            anyhow::bail!("scene graph is locked")
        }
    }

    let mut harness = Harness::with_pool_floats(HeadlessDevice::new(), 64);
    let mut lane = ForwardLane::new(&harness.device, &RendererConfig::default(), targets()).unwrap();

    let (result, commands) =
        harness.render(&mut lane, Some(&camera()), QueueSource::Cull(&mut Locked));
    assert!(matches!(result, Err(LaneError::Culling(_))));
    assert!(commands.is_empty());

    let mut heavy = mesh(1, 1, Mat4::IDENTITY);
    heavy.instance_uniforms = vec![0.0; 64];
    let mut culler = ListCuller {
        drawables: vec![heavy.into()],
        lights: Vec::new(),
        calls: 0,
    };
    let (result, _) = harness.render(&mut lane, Some(&camera()), QueueSource::Cull(&mut culler));
    assert!(matches!(
        result,
        Err(LaneError::InstanceStrideTooLarge {
            stride: 80,
            capacity: 64
        })
    ));
}

#[test]
fn shadow_lane_draws_opaque_items_into_depth_only() {
    let mut harness = Harness::new(HeadlessDevice::new());
    let mut lane = ShadowLane::new(&harness.device, DEPTH_VIEW);
    let mut glass = mesh(2, 3, Mat4::IDENTITY);
    glass.transparent = true;
    let mut queue = harness.queue(&[cube(1, 0.0), glass.into()]);

    let (result, commands) =
        harness.render(&mut lane, Some(&camera()), QueueSource::Precomputed(&mut queue));
    let outcome = result.unwrap();

    assert_eq!(outcome.draw_calls, 1);
    assert_eq!(
        commands.first(),
        Some(&RecordedCommand::BeginRenderPass {
            label: Some("ShadowLane".to_string()),
            color_targets: Vec::new(),
            color_loads: Vec::new(),
            depth_load: Some(LoadOp::Clear(1.0)),
            stencil_load: None,
        })
    );
    assert_eq!(draws(&commands), vec![(ProgramId(1), FrontFace::Ccw)]);
}

#[test]
fn disposed_lanes_render_again() {
    let mut harness = Harness::new(HeadlessDevice::new());
    let mut lane = ForwardLane::new(&harness.device, &RendererConfig::default(), targets()).unwrap();
    let mut queue = harness.queue(&[cube(1, 0.0)]);
    harness
        .render(&mut lane, Some(&camera()), QueueSource::Precomputed(&mut queue))
        .0
        .unwrap();
    let buffers_alive = harness.device.live_buffer_count();

    lane.dispose(&harness.device);
    assert_eq!(lane.core().state(), PassState::Disposed);
    assert!(lane.cluster_grid().is_none());
    assert!(lane.core().bind_groups().is_empty());
    assert!(harness.device.live_buffer_count() < buffers_alive);

    let (result, _) =
        harness.render(&mut lane, Some(&camera()), QueueSource::Precomputed(&mut queue));
    assert_eq!(result.unwrap().draw_calls, 1);
    assert_eq!(lane.core().state(), PassState::Active);
    assert!(lane.cluster_grid().is_some());
    assert_eq!(harness.device.live_buffer_count(), buffers_alive);
}
