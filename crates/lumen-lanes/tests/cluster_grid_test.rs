use lumen_core::math::{Aabb, Mat4, Vec3};
use lumen_core::renderer::api::DeviceCapabilities;
use lumen_core::renderer::{
    CameraView, GraphicsDevice, Light, LightId, LightRecord, Viewport, MAX_CLUSTERED_LIGHTS,
};
use lumen_infra::{HeadlessDevice, KernelInvocation};
use lumen_lanes::render_lane::{
    ClusterGrid, ClusterGridConfig, ClusterIndexFormat, ClusterMetrics, ClusterUniform,
    QueuedLight,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn camera() -> CameraView {
    CameraView::perspective(
        Vec3::new(0.0, 2.0, 10.0),
        Vec3::new(0.0, 0.0, -20.0),
        Vec3::Y,
        70f32.to_radians(),
        Viewport::new(1920.0, 1080.0),
        0.5,
        200.0,
    )
}

fn point_light(id: u64, position: Vec3, range: f32) -> QueuedLight {
    let mut light = Light::point(LightId(id), range);
    light.set_transform(Mat4::from_translation(position));
    QueuedLight::from_light(&mut light)
}

fn read_texels(device: &HeadlessDevice, grid: &ClusterGrid) -> Vec<[u32; 4]> {
    bytemuck::pod_collect_to_vec(&device.texture_data(grid.texture()).unwrap())
}

/// Host version of the culling shaders: bins one cell from the uploaded
/// uniform and light records.
fn cull_cell(uniform: &ClusterUniform, lights: &[LightRecord], cell: u32) -> Vec<u8> {
    let [tiles_x, tiles_y, tiles_z, _] = uniform.grid;
    let per_slice = tiles_x * tiles_y;
    let (x, y, z) = (cell % tiles_x, (cell % per_slice) / tiles_x, cell / per_slice);

    let inverse_projection = Mat4::from_cols_array_2d(&uniform.inverse_projection);
    let view = Mat4::from_cols_array_2d(&uniform.view);
    let [near, far, ..] = uniform.depth;
    let depth = |slice: u32| near * (far / near).powf(slice as f32 / tiles_z as f32);
    let (depth_near, depth_far) = (depth(z), depth(z + 1));
    let ray = |corner_x: u32, corner_y: u32| {
        let ndc = Vec3::new(
            -1.0 + 2.0 * corner_x as f32 / tiles_x as f32,
            1.0 - 2.0 * corner_y as f32 / tiles_y as f32,
            0.5,
        );
        let point = inverse_projection.project_point3(ndc);
        point / -point.z
    };
    let corners: Vec<Vec3> = [(x, y), (x + 1, y), (x, y + 1), (x + 1, y + 1)]
        .into_iter()
        .flat_map(|(cx, cy)| {
            let ray = ray(cx, cy);
            [ray * depth_near, ray * depth_far]
        })
        .collect();
    let bounds = Aabb::from_points(&corners).unwrap();

    let [count, per_cell, ..] = uniform.counts;
    (1..=count)
        .filter(|slot| {
            let light = &lights[*slot as usize];
            bounds.intersects_sphere(view.transform_point3(light.position()), light.range())
        })
        .take(per_cell as usize)
        .map(|slot| slot as u8)
        .collect()
}

/// Runs [`cull_cell`] for every culling dispatch or point draw the device
/// executes.
fn register_cull_kernels(device: &HeadlessDevice) {
    for format in [ClusterIndexFormat::PackedUint, ClusterIndexFormat::PackedFloat] {
        device.register_kernel(
            format.cull_entry_point(),
            move |invocation: &mut KernelInvocation<'_>| {
                let uniform: ClusterUniform =
                    bytemuck::pod_read_unaligned(invocation.buffer(0, 1).unwrap());
                let lights: Vec<LightRecord> =
                    bytemuck::pod_collect_to_vec(invocation.buffer(0, 0).unwrap());
                let cell = invocation.linear_id();
                let texel = format.encode_texel(&cull_cell(&uniform, &lights, cell));
                let width = uniform.grid[3];
                assert!(invocation.store_texel(cell % width, cell / width, texel));
            },
        );
    }
}

fn cull(
    device: &HeadlessDevice,
    grid: &mut ClusterGrid,
    camera: &CameraView,
    lights: &[QueuedLight],
) -> ClusterMetrics {
    let mut encoder = device.create_command_encoder(Some("Cluster Test"));
    let metrics = *grid
        .calculate_light_index(device, encoder.as_mut(), camera, lights)
        .unwrap();
    device.submit_command_buffer(encoder.finish());
    metrics
}

/// Slots of every light whose sphere, scaled by `radius_scale`, touches the
/// cell. Corners are unprojected from NDC through the inverse
/// view-projection into world space, then moved into view space.
fn reference_slots(
    config: &ClusterGridConfig,
    camera: &CameraView,
    lights: &[QueuedLight],
    (x, y, z): (u32, u32, u32),
    radius_scale: f32,
) -> Vec<u8> {
    let inverse_view_projection = (camera.projection * camera.view).inverse();
    let direction = |corner_x: u32, corner_y: u32| {
        let ndc = Vec3::new(
            corner_x as f32 / config.tiles_x as f32 * 2.0 - 1.0,
            1.0 - corner_y as f32 / config.tiles_y as f32 * 2.0,
            1.0,
        );
        let on_far_plane = camera
            .view
            .transform_point3(inverse_view_projection.project_point3(ndc));
        on_far_plane / -on_far_plane.z
    };
    let slices = config.tiles_z as f32;
    let ratio = camera.far / camera.near;
    let near = camera.near * ratio.powf(z as f32 / slices);
    let far = camera.near * ratio.powf((z + 1) as f32 / slices);

    let mut corners = Vec::with_capacity(8);
    for (cx, cy) in [(x, y), (x + 1, y), (x, y + 1), (x + 1, y + 1)] {
        let direction = direction(cx, cy);
        corners.push(direction * near);
        corners.push(direction * far);
    }
    let cell = Aabb::from_points(&corners).unwrap();

    lights
        .iter()
        .enumerate()
        .filter(|(_, light)| {
            let center = camera.view.transform_point3(light.record.position());
            cell.intersects_sphere(center, light.record.range() * radius_scale)
        })
        .map(|(index, _)| (index + 1) as u8)
        .collect()
}

#[test]
fn ten_lights_match_an_independent_reference() {
    init_logger();
    let device = HeadlessDevice::new();
    register_cull_kernels(&device);
    let config = ClusterGridConfig::default();
    let mut grid = ClusterGrid::new(&device, &config).unwrap();
    assert_eq!(grid.format(), ClusterIndexFormat::PackedUint);

    let camera = camera();
    let mut lights: Vec<QueuedLight> = (0..9)
        .map(|i| {
            let position = Vec3::new(-8.0 + 2.0 * i as f32, (i % 3) as f32, -5.0 - 6.0 * i as f32);
            point_light(i, position, 1.5 + 0.5 * i as f32)
        })
        .collect();
    // Unbounded light, placed far behind the camera.
    lights.insert(4, point_light(99, Vec3::new(0.0, 0.0, 500.0), 0.0));

    let metrics = cull(&device, &mut grid, &camera, &lights);
    assert_eq!(
        metrics,
        ClusterMetrics {
            total_lights: 10,
            clustered_lights: 10,
            truncated_lights: 0,
            dispatched_cells: config.cell_count(),
        }
    );
    assert_eq!(device.texture_write_count(grid.texture()), 0);

    let format = grid.format();
    let texels = read_texels(&device, &grid);
    let mut cells_with_bounded_lights = 0;
    for z in 0..config.tiles_z {
        for y in 0..config.tiles_y {
            for x in 0..config.tiles_x {
                let slots = format.decode_texel(texels[config.cell_index(x, y, z)]);
                assert!(slots.contains(&5), "cell ({x}, {y}, {z}) misses the unbounded light");

                // Radii nudged by 0.1% absorb rounding between the two
                // unprojections.
                let surely_in = reference_slots(&config, &camera, &lights, (x, y, z), 0.999);
                let maybe_in = reference_slots(&config, &camera, &lights, (x, y, z), 1.001);
                for slot in &surely_in {
                    assert!(slots.contains(slot), "cell ({x}, {y}, {z}) misses light {slot}");
                }
                for slot in &slots {
                    assert!(
                        maybe_in.contains(slot),
                        "cell ({x}, {y}, {z}) holds distant light {slot}"
                    );
                }
                if slots.len() > 1 {
                    cells_with_bounded_lights += 1;
                }
            }
        }
    }
    assert!(cells_with_bounded_lights > 0);
}

#[test]
fn cells_left_of_the_view_axis_miss_lights_on_the_right() {
    let device = HeadlessDevice::new();
    register_cull_kernels(&device);
    let config = ClusterGridConfig {
        tiles_x: 4,
        tiles_y: 4,
        tiles_z: 4,
    };
    let mut grid = ClusterGrid::new(&device, &config).unwrap();
    let camera = CameraView::perspective(
        Vec3::ZERO,
        Vec3::NEG_Z,
        Vec3::Y,
        60f32.to_radians(),
        Viewport::new(1024.0, 1024.0),
        0.1,
        100.0,
    );
    cull(
        &device,
        &mut grid,
        &camera,
        &[point_light(1, Vec3::new(6.0, 0.0, -10.0), 1.0)],
    );

    let texels = read_texels(&device, &grid);
    let lit: Vec<usize> = (0..config.cell_count() as usize)
        .filter(|cell| texels[*cell] != [0; 4])
        .collect();
    assert!(!lit.is_empty());
    assert!(lit.iter().all(|cell| cell % 4 >= 2));
}

#[test]
fn light_buffer_reserves_slot_zero() {
    let device = HeadlessDevice::new();
    let mut grid = ClusterGrid::new(&device, &ClusterGridConfig::default()).unwrap();
    let lights = [
        point_light(1, Vec3::new(1.0, 0.0, -4.0), 3.0),
        point_light(2, Vec3::new(-1.0, 0.0, -4.0), 2.0),
    ];
    cull(&device, &mut grid, &camera(), &lights);

    let records: Vec<LightRecord> =
        bytemuck::pod_collect_to_vec(&device.buffer_data(grid.light_buffer()).unwrap());
    assert_eq!(records.len(), MAX_CLUSTERED_LIGHTS + 1);
    assert_eq!(records[0], LightRecord::default());
    assert_eq!(records[1], lights[0].record);
    assert_eq!(records[2], lights[1].record);
    assert_eq!(records[3], LightRecord::default());
    assert_eq!(device.buffer_write_count(grid.uniform_buffer()), 1);
}

#[test]
fn extra_lights_are_truncated() {
    init_logger();
    let device = HeadlessDevice::new();
    let mut grid = ClusterGrid::new(&device, &ClusterGridConfig::default()).unwrap();
    let lights: Vec<QueuedLight> = (0..300)
        .map(|i| point_light(i, Vec3::new(i as f32 * 0.1, 0.0, -10.0), 0.5))
        .collect();

    let metrics = cull(&device, &mut grid, &camera(), &lights);
    assert_eq!(metrics.clustered_lights, MAX_CLUSTERED_LIGHTS);
    assert_eq!(metrics.truncated_lights, 45);

    let records: Vec<LightRecord> =
        bytemuck::pod_collect_to_vec(&device.buffer_data(grid.light_buffer()).unwrap());
    assert_eq!(records[MAX_CLUSTERED_LIGHTS], lights[MAX_CLUSTERED_LIGHTS - 1].record);
    let uniform: ClusterUniform =
        bytemuck::pod_read_unaligned(&device.buffer_data(grid.uniform_buffer()).unwrap());
    assert_eq!(uniform.counts[0], MAX_CLUSTERED_LIGHTS as u32);
}

#[test]
fn packed_float_cells_keep_the_first_eight_slots() {
    init_logger();
    let device = HeadlessDevice::with_capabilities(DeviceCapabilities::limited());
    register_cull_kernels(&device);
    let config = ClusterGridConfig {
        tiles_x: 4,
        tiles_y: 4,
        tiles_z: 4,
    };
    let mut grid = ClusterGrid::new(&device, &config).unwrap();
    assert_eq!(grid.format(), ClusterIndexFormat::PackedFloat);
    assert_eq!(grid.dimensions(), (8, 8));

    let lights: Vec<QueuedLight> = (0..12)
        .map(|i| point_light(i, Vec3::ZERO, 0.0))
        .collect();
    let metrics = cull(&device, &mut grid, &camera(), &lights);
    assert_eq!(metrics.dispatched_cells, 64);

    let expected: Vec<u8> = (1..=8).collect();
    for texel in read_texels(&device, &grid) {
        assert_eq!(grid.format().decode_texel(texel), expected);
    }
}

#[test]
fn zero_lights_reset_the_index_without_touching_the_light_buffer() {
    let device = HeadlessDevice::new();
    register_cull_kernels(&device);
    let mut grid = ClusterGrid::new(&device, &ClusterGridConfig::default()).unwrap();
    let camera = camera();

    cull(&device, &mut grid, &camera, &[point_light(1, Vec3::ZERO, 0.0)]);
    assert!(read_texels(&device, &grid).iter().all(|t| *t != [0; 4]));
    assert_eq!(device.buffer_write_count(grid.light_buffer()), 1);

    let metrics = cull(&device, &mut grid, &camera, &[]);
    assert_eq!(metrics.dispatched_cells, 0);
    assert!(read_texels(&device, &grid).iter().all(|t| *t == [0; 4]));
    assert_eq!(device.buffer_write_count(grid.light_buffer()), 1);
    assert_eq!(device.texture_write_count(grid.texture()), 0);
}
