use criterion::{Criterion, black_box, criterion_group, criterion_main};

use vermilion_graphics::binding::RootSignatureBuilder;
use vermilion_graphics::context::RenderContext;
use vermilion_graphics::error::GraphicsError;
use vermilion_graphics::pass::{
    PassBehavior, PassKind, PassResourceDeclaration, RenderPass, RenderPassManager,
    ResourceTableId,
};
use vermilion_graphics::types::{
    AddressMode, BufferDescriptor, BufferUsage, FilterMode, TextureDescriptor, TextureFormat,
};
use vermilion_graphics::vt::{AtlasSlot, PageKey, PageTable, PhysicalTexture};
use vermilion_graphics::GraphicsInstance;

// ---------------------------------------------------------------------------
// Schedule validation
// ---------------------------------------------------------------------------

struct StubPass {
    name: String,
    declaration: PassResourceDeclaration,
}

impl PassBehavior for StubPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PassKind {
        PassKind::Graphics
    }

    fn declare_resources(&self) -> PassResourceDeclaration {
        self.declaration.clone()
    }

    fn init_pass(&mut self, _ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        Ok(())
    }

    fn render(&mut self, _ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        Ok(())
    }
}

fn chained_manager(length: u16) -> RenderPassManager {
    let target = TextureDescriptor::render_target(64, 64, TextureFormat::Rgba8Unorm);
    let mut manager = RenderPassManager::new();
    for index in 0..length {
        let mut declaration = PassResourceDeclaration::new()
            .export(ResourceTableId::VtFeedback(index), target.clone());
        if index > 0 {
            declaration = declaration.import(ResourceTableId::VtFeedback(index - 1));
        }
        manager.add_render_pass(RenderPass::new(StubPass {
            name: format!("pass_{index}"),
            declaration,
        }));
    }
    manager
}

fn bench_validate_schedule_small(c: &mut Criterion) {
    let manager = chained_manager(4);
    c.bench_function("validate_schedule_4_passes_chain", |b| {
        b.iter(|| black_box(manager.validate_schedule().unwrap()));
    });
}

fn bench_validate_schedule_large(c: &mut Criterion) {
    let manager = chained_manager(32);
    c.bench_function("validate_schedule_32_passes_chain", |b| {
        b.iter(|| black_box(manager.validate_schedule().unwrap()));
    });
}

// ---------------------------------------------------------------------------
// Root signature construction
// ---------------------------------------------------------------------------

fn populated_builder() -> RootSignatureBuilder {
    let mut builder = RootSignatureBuilder::new("bench");
    builder.add_cbv_root_parameter("FRAME_CONSTANTS", 0);
    for index in 0..8 {
        builder.add_srv_root_parameter(format!("TEXTURE_{index}"), 0);
    }
    builder.add_uav_root_parameter("OUTPUT", 1);
    builder.add_static_sampler(
        "LINEAR_SAMPLER",
        AddressMode::Repeat,
        FilterMode::Linear,
        0,
    );
    builder.add_constant_root_parameter("PUSH_DATA", 16, 2);
    builder
}

fn bench_root_signature_build(c: &mut Criterion) {
    c.bench_function("root_signature_build_12_parameters", |b| {
        b.iter_with_setup(populated_builder, |builder| {
            black_box(builder.build());
        });
    });
}

fn bench_register_macros(c: &mut Criterion) {
    let signature = populated_builder().build();
    c.bench_function("root_signature_register_macros", |b| {
        b.iter(|| black_box(signature.register_macros()));
    });
}

// ---------------------------------------------------------------------------
// Virtual texture bookkeeping
// ---------------------------------------------------------------------------

fn bench_page_table_touch(c: &mut Criterion) {
    c.bench_function("page_table_touch_64x64", |b| {
        b.iter_with_setup(
            || PageTable::new(0, 64),
            |mut table| {
                for y in 0..64 {
                    for x in 0..64 {
                        table.touch(0, x, y, AtlasSlot { x: 0, y: 0 });
                    }
                }
                black_box(table);
            },
        );
    });
}

fn bench_indirection_rebuild(c: &mut Criterion) {
    let mut table = PageTable::new(0, 64);
    // Sparse residency: mip 0 every 4th page plus the whole mip 2.
    for y in (0..64).step_by(4) {
        for x in (0..64).step_by(4) {
            table.touch(0, x, y, AtlasSlot { x: 1, y: 1 });
        }
    }
    for y in 0..16 {
        for x in 0..16 {
            table.touch(2, x, y, AtlasSlot { x: 2, y: 2 });
        }
    }
    c.bench_function("indirection_rebuild_64x64", |b| {
        b.iter(|| black_box(table.indirection_data()));
    });
}

fn bench_lru_ingest_with_eviction(c: &mut Criterion) {
    // 64 slots; ingesting 128 pages evicts half of them.
    let page = vec![0u8; PhysicalTexture::new(512, 64, 0).page_byte_size()];
    c.bench_function("atlas_ingest_128_pages_64_slots", |b| {
        b.iter_with_setup(
            || PhysicalTexture::new(512, 64, 0),
            |mut atlas| {
                for n in 0..128 {
                    atlas.ingest(PageKey::new(0, 0, n, 0), &page);
                }
                black_box(atlas.resident_count());
            },
        );
    });
}

// ---------------------------------------------------------------------------
// Dummy backend resource creation
// ---------------------------------------------------------------------------

fn bench_dummy_create_buffer(c: &mut Criterion) {
    let instance = GraphicsInstance::new().unwrap();
    let device = instance.create_device().unwrap();

    c.bench_function("dummy_create_buffer_1kb", |b| {
        b.iter(|| {
            let buffer = device
                .create_buffer(&BufferDescriptor::new(1024, BufferUsage::STORAGE))
                .unwrap();
            black_box(buffer);
        });
    });
}

criterion_group!(
    benches,
    bench_validate_schedule_small,
    bench_validate_schedule_large,
    bench_root_signature_build,
    bench_register_macros,
    bench_page_table_touch,
    bench_indirection_rebuild,
    bench_lru_ingest_with_eviction,
    bench_dummy_create_buffer,
);
criterion_main!(benches);
