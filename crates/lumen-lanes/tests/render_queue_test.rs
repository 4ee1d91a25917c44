use lumen_core::math::{Mat4, Vec3};
use lumen_core::renderer::api::{BindGroupId, BufferId, FrameFence, IndexFormat, ProgramId};
use lumen_core::renderer::{
    CameraView, Drawable, DrawableId, GpuGeometry, Light, LightId, MaterialBinding, MeshDrawable,
    Viewport,
};
use lumen_infra::HeadlessDevice;
use lumen_lanes::render_lane::{PoolContext, RenderQueue, UniformBufferPool};
use lumen_lanes::LaneError;

fn camera() -> CameraView {
    CameraView::perspective(
        Vec3::ZERO,
        Vec3::NEG_Z,
        Vec3::Y,
        60f32.to_radians(),
        Viewport::new(800.0, 600.0),
        0.1,
        100.0,
    )
}

fn geometry() -> GpuGeometry {
    GpuGeometry {
        vertex_buffer: BufferId(100),
        index_buffer: Some((BufferId(101), IndexFormat::Uint32)),
        element_count: 36,
    }
}

fn material(program: usize) -> MaterialBinding {
    MaterialBinding {
        program: ProgramId(program),
        bind_group: BindGroupId(200 + program),
    }
}

fn cube_at(id: u64, z: f32) -> Drawable {
    MeshDrawable::new(
        DrawableId(id),
        geometry(),
        material(1),
        Mat4::from_translation(Vec3::new(0.0, 0.0, z)),
    )
    .into()
}

struct Fixture {
    device: HeadlessDevice,
    fence: FrameFence,
    pool: UniformBufferPool,
    queue: RenderQueue,
    camera: CameraView,
}

impl Fixture {
    fn new(capacity_floats: usize) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let device = HeadlessDevice::new();
        let pool = UniformBufferPool::with_capacity_floats(&device, capacity_floats).unwrap();
        let mut fence = FrameFence::new(2);
        fence.begin_frame().unwrap();
        Self {
            device,
            fence,
            pool,
            queue: RenderQueue::new(),
            camera: camera(),
        }
    }

    fn push(&mut self, drawable: &Drawable, order: i32) -> Result<(), LaneError> {
        let mut ctx = PoolContext {
            device: &self.device,
            fence: &self.fence,
            pool: &mut self.pool,
        };
        self.queue.push(&mut ctx, &self.camera, drawable, order)
    }

    fn batch_sizes(&self) -> Vec<usize> {
        self.queue
            .iter()
            .map(|item| item.instance.as_ref().map_or(0, |i| i.current_size))
            .collect()
    }
}

#[test]
fn batches_fill_up_to_the_pool_capacity() {
    let mut fixture = Fixture::new(64);

    for i in 0..3 {
        fixture.push(&cube_at(i, -(i as f32) - 1.0), 0).unwrap();
    }
    assert_eq!(fixture.batch_sizes(), vec![3]);
    let first = fixture.queue.iter().next().unwrap().instance.clone().unwrap();
    assert_eq!(first.stride, 16);
    assert_eq!(first.max_size, 4);

    fixture.push(&cube_at(3, -4.0), 0).unwrap();
    assert_eq!(fixture.batch_sizes(), vec![4]);

    fixture.push(&cube_at(4, -5.0), 0).unwrap();
    assert_eq!(fixture.batch_sizes(), vec![4, 1]);
    assert_eq!(fixture.pool.high_water_mark(), 2);
    assert!(fixture
        .queue
        .iter()
        .filter_map(|item| item.instance.as_ref())
        .all(|instance| instance.current_size <= instance.max_size));

    fixture.pool.flush(&fixture.device).unwrap();
    let buffer = fixture.pool.buffer(first.handle).unwrap();
    let floats: Vec<f32> =
        bytemuck::pod_collect_to_vec(&fixture.device.buffer_data(buffer).unwrap());
    let translations_z: Vec<f32> = (0..4).map(|i| floats[i * 16 + 14]).collect();
    assert_eq!(translations_z, vec![-1.0, -2.0, -3.0, -4.0]);
}

#[test]
fn differing_signatures_start_separate_batches() {
    let mut fixture = Fixture::new(256);

    let plain = cube_at(1, -2.0);
    let mirrored: Drawable = MeshDrawable::new(
        DrawableId(2),
        geometry(),
        material(1),
        Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0)),
    )
    .into();
    let other_material: Drawable =
        MeshDrawable::new(DrawableId(3), geometry(), material(2), Mat4::IDENTITY).into();
    let mut glass = MeshDrawable::new(DrawableId(4), geometry(), material(1), Mat4::IDENTITY);
    glass.transparent = true;
    let glass: Drawable = glass.into();
    let mut tinted = MeshDrawable::new(DrawableId(5), geometry(), material(1), Mat4::IDENTITY);
    tinted.instance_uniforms = vec![1.0, 0.0, 0.0, 1.0];
    let tinted: Drawable = tinted.into();

    for drawable in [&plain, &mirrored, &other_material, &glass, &tinted] {
        fixture.push(drawable, 0).unwrap();
    }
    fixture.push(&cube_at(6, -3.0), 1).unwrap();
    fixture.push(&cube_at(7, -3.0), 0).unwrap();

    assert_eq!(fixture.queue.item_count(), 6);
    assert_eq!(fixture.queue.instance_count(), 7);
}

#[test]
fn non_instancable_drawables_are_singletons() {
    let mut fixture = Fixture::new(64);
    let mut single = MeshDrawable::new(DrawableId(1), geometry(), material(1), Mat4::IDENTITY);
    single.instancable = false;
    let single: Drawable = single.into();

    fixture.push(&single, 0).unwrap();
    fixture.push(&single, 0).unwrap();

    assert_eq!(fixture.queue.item_count(), 2);
    assert!(fixture.queue.iter().all(|item| item.instance.is_none()));
    assert_eq!(fixture.pool.high_water_mark(), 0);
}

#[test]
fn oversized_stride_is_rejected() {
    let mut fixture = Fixture::new(64);
    let mut heavy = MeshDrawable::new(DrawableId(1), geometry(), material(1), Mat4::IDENTITY);
    heavy.instance_uniforms = vec![0.0; 60];

    let result = fixture.push(&heavy.into(), 0);
    assert!(matches!(
        result,
        Err(LaneError::InstanceStrideTooLarge {
            stride: 76,
            capacity: 64
        })
    ));
    assert!(fixture.queue.is_empty());
}

#[test]
fn sorting_is_per_order_and_idempotent() {
    let mut fixture = Fixture::new(16);

    // A 16-float pool holds one instance, so every cube is its own item.
    for (id, z) in [(1, -5.0), (2, -1.0), (3, -3.0)] {
        fixture.push(&cube_at(id, z), 0).unwrap();
    }
    for (id, z) in [(4, -2.0), (5, -6.0), (6, -4.0)] {
        let mut glass = MeshDrawable::new(
            DrawableId(id),
            geometry(),
            material(1),
            Mat4::from_translation(Vec3::new(0.0, 0.0, z)),
        );
        glass.transparent = true;
        fixture.push(&glass.into(), 0).unwrap();
    }
    fixture.push(&cube_at(7, -0.5), -1).unwrap();

    fixture.queue.sort_items();
    let ids = |queue: &RenderQueue| -> Vec<u64> {
        queue.iter().map(|item| item.drawable.id().0).collect()
    };
    let first = ids(&fixture.queue);
    assert_eq!(first, vec![7, 2, 3, 1, 5, 6, 4]);

    fixture.queue.sort_items();
    assert_eq!(ids(&fixture.queue), first);
    let opaque: Vec<u64> = fixture
        .queue
        .iter_opaque()
        .map(|i| i.drawable.id().0)
        .collect();
    assert_eq!(opaque, vec![7, 2, 3, 1]);
}

#[test]
fn identical_frames_reuse_pooled_buffers() {
    let mut fixture = Fixture::new(64);
    let scene: Vec<Drawable> = (0..10).map(|i| cube_at(i, -(i as f32) - 1.0)).collect();

    let first_frame = fixture.fence.current();
    for drawable in &scene {
        fixture.push(drawable, 0).unwrap();
    }
    assert_eq!(fixture.pool.take_created_count(), 3);

    fixture.fence.signal(first_frame);
    fixture.fence.begin_frame().unwrap();
    fixture.queue.clear();
    for drawable in &scene {
        fixture.push(drawable, 0).unwrap();
    }
    assert_eq!(fixture.pool.take_created_count(), 0);
    assert_eq!(fixture.pool.high_water_mark(), 3);
    assert_eq!(fixture.batch_sizes(), vec![4, 4, 2]);
}

#[test]
fn unfinished_frames_keep_their_buffers() {
    let mut fixture = Fixture::new(64);
    let scene: Vec<Drawable> = (0..4).map(|i| cube_at(i, -1.0)).collect();

    for drawable in &scene {
        fixture.push(drawable, 0).unwrap();
    }
    fixture.fence.begin_frame().unwrap();
    fixture.queue.clear();
    for drawable in &scene {
        fixture.push(drawable, 0).unwrap();
    }
    assert_eq!(fixture.pool.high_water_mark(), 2);
    assert_eq!(fixture.pool.in_flight_count(), 2);
}

#[test]
fn every_distinct_light_is_queued_once() {
    let mut queue = RenderQueue::new();
    let mut lights: Vec<Light> = (0..6)
        .map(|i| Light::point(LightId(i), 2.0).with_shadows(i % 2 == 0))
        .collect();

    let mut accepted = 0;
    for _ in 0..3 {
        for light in &mut lights {
            if queue.push_light(light) {
                accepted += 1;
            }
        }
    }
    assert_eq!(accepted, 6);
    assert_eq!(
        queue.shadowed_lights().len() + queue.unshadowed_lights().len(),
        6
    );
    assert!(queue.shadowed_lights().iter().all(|l| l.cast_shadows));
    assert!(queue.sun().is_none());
}
