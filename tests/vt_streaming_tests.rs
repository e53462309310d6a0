//! Virtual texture streaming against a file-backed page store.
//!
//! The unit tests cover residency and eviction with an in-memory accessor;
//! these drive the whole loop the way a shipped title would: pages baked to
//! disk, streamed on the worker thread, uploaded inside real frames.

mod common;

use std::time::{Duration, Instant};

use common::dummy_context;
use vermilion_graphics::pass::ResourceTableId;
use vermilion_graphics::vt::{
    write_page_file, FilePageAccessor, PageKey, PageRequest, VirtualTextureConfig,
    VirtualTextureSystem,
};
use vermilion_graphics::RenderContext;

// Borderless 4-texel pages in a 2x2-slot atlas.
fn small_config() -> VirtualTextureConfig {
    VirtualTextureConfig {
        page_size: 4,
        texture_size: 8,
        border: 0,
        page_process_count_per_frame: 16,
    }
}

fn page_bytes(config: &VirtualTextureConfig) -> usize {
    let padded = config.page_size + 2 * config.border;
    (padded * padded * 4) as usize
}

fn tick_until(
    ctx: &mut RenderContext,
    system: &mut VirtualTextureSystem,
    feedback: &[PageRequest],
    done: impl Fn(&VirtualTextureSystem) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(system) {
        assert!(Instant::now() < deadline, "streaming timed out");
        ctx.begin_frame();
        system.tick(ctx, feedback).unwrap();
        ctx.end_frame().unwrap();
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_streams_pages_from_disk() {
    let mut ctx = dummy_context();
    let config = small_config();
    let store = tempfile::tempdir().unwrap();

    for key in [PageKey::new(0, 0, 0, 0), PageKey::new(0, 0, 1, 0)] {
        write_page_file(
            store.path(),
            key,
            &vec![0x3C; page_bytes(&config)],
            page_bytes(&config),
        )
        .unwrap();
    }

    let accessor = FilePageAccessor::new(store.path(), page_bytes(&config));
    let mut system = VirtualTextureSystem::new(config, Box::new(accessor));
    system.init(&mut ctx).unwrap();
    system.register_logical_texture(&mut ctx, 0, 16).unwrap();

    assert!(ctx.resources.contains(ResourceTableId::VtPhysical(0)));
    assert!(ctx.resources.contains(ResourceTableId::VtPageTable(0)));

    let feedback = [PageRequest::new(0, 0, 0, 0), PageRequest::new(0, 0, 1, 0)];
    tick_until(&mut ctx, &mut system, &feedback, |s| s.resident_count() == 2);

    let table = system.page_table(0).unwrap();
    assert!(table.slot_at(0, 0, 0).is_some());
    assert!(table.slot_at(0, 1, 0).is_some());
    // The two pages pack into distinct atlas slots.
    assert_ne!(table.slot_at(0, 0, 0), table.slot_at(0, 1, 0));
}

#[test]
fn test_page_missing_on_disk_retries_without_failing() {
    let mut ctx = dummy_context();
    let config = small_config();
    let store = tempfile::tempdir().unwrap();
    let bytes = page_bytes(&config);

    let accessor = FilePageAccessor::new(store.path(), bytes);
    let mut system = VirtualTextureSystem::new(config, Box::new(accessor));
    system.init(&mut ctx).unwrap();
    system.register_logical_texture(&mut ctx, 0, 16).unwrap();

    // Enqueue the miss, then drain the failed load.
    let key = PageKey::new(0, 0, 1, 1);
    let feedback = [PageRequest::new(0, 0, 1, 1)];
    ctx.begin_frame();
    system.tick(&mut ctx, &feedback).unwrap();
    ctx.end_frame().unwrap();
    tick_until(&mut ctx, &mut system, &[], |s| s.pending_count() == 0);
    assert_eq!(system.resident_count(), 0);

    // Bake the page; the next feedback request succeeds.
    write_page_file(store.path(), key, &vec![0xEE; bytes], bytes).unwrap();
    tick_until(&mut ctx, &mut system, &feedback, |s| s.resident_count() == 1);
    assert!(system.page_table(0).unwrap().slot_at(0, 1, 1).is_some());
}

#[test]
fn test_truncated_page_file_is_a_load_failure() {
    let mut ctx = dummy_context();
    let config = small_config();
    let store = tempfile::tempdir().unwrap();
    let bytes = page_bytes(&config);

    let key = PageKey::new(0, 0, 0, 0);
    std::fs::write(store.path().join(key.file_name()), vec![0u8; bytes / 2]).unwrap();

    let accessor = FilePageAccessor::new(store.path(), bytes);
    let mut system = VirtualTextureSystem::new(config, Box::new(accessor));
    system.init(&mut ctx).unwrap();
    system.register_logical_texture(&mut ctx, 0, 16).unwrap();

    let feedback = [PageRequest::new(0, 0, 0, 0)];
    ctx.begin_frame();
    system.tick(&mut ctx, &feedback).unwrap();
    ctx.end_frame().unwrap();
    tick_until(&mut ctx, &mut system, &[], |s| s.pending_count() == 0);

    assert_eq!(system.resident_count(), 0);
}
