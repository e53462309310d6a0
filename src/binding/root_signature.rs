//! Root signature construction.

use std::collections::HashMap;

use crate::types::{AddressMode, FilterMode};

/// Descriptor count marking a table range as bindless (unbounded).
pub const BINDLESS_DESCRIPTOR_COUNT: u32 = u32::MAX;

/// Shader register kind, matching the HLSL register prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    /// Constant buffer view (`b` registers).
    ConstantBuffer,
    /// Shader resource view (`t` registers).
    ShaderResource,
    /// Unordered access view (`u` registers).
    UnorderedAccess,
    /// Sampler (`s` registers).
    Sampler,
}

impl RegisterKind {
    /// The HLSL register prefix character.
    pub fn prefix(&self) -> char {
        match self {
            Self::ConstantBuffer => 'b',
            Self::ShaderResource => 't',
            Self::UnorderedAccess => 'u',
            Self::Sampler => 's',
        }
    }
}

/// The slot a declared binding received in the root signature.
///
/// Register indices are handed out sequentially per (kind, space) while the
/// builder runs and are fixed once the signature is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootSignatureAllocation {
    /// Index of the root parameter in declaration order.
    pub parameter_index: u32,
    /// Shader register index within (kind, space).
    pub register_index: u32,
    /// Register space.
    pub space: u32,
    /// Register kind, determines the macro prefix.
    pub kind: RegisterKind,
}

impl RootSignatureAllocation {
    /// The HLSL register expression for this allocation, e.g.
    /// `register(t2, space1)`.
    pub fn register_expression(&self) -> String {
        format!(
            "register({}{}, space{})",
            self.kind.prefix(),
            self.register_index,
            self.space
        )
    }

    /// A `#define` line binding `name` to this allocation's register.
    pub fn register_macro(&self, name: &str) -> String {
        format!("#define {} {}", name, self.register_expression())
    }
}

/// What a root parameter binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootParameterKind {
    /// A single constant buffer view.
    Cbv,
    /// A single shader resource view.
    Srv,
    /// A single unordered access view.
    Uav,
    /// A descriptor table range. `count == BINDLESS_DESCRIPTOR_COUNT` marks
    /// the range as bindless.
    Table { range_type: RegisterKind, count: u32 },
    /// A sampler baked into the signature.
    StaticSampler {
        address_mode: AddressMode,
        filter_mode: FilterMode,
    },
    /// Inline root constants.
    Constants { dword_count: u32 },
}

/// A declared root parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootParameter {
    /// Binding name; the macro name shaders see.
    pub name: String,
    /// What the parameter binds.
    pub kind: RootParameterKind,
    /// The slot it received.
    pub allocation: RootSignatureAllocation,
}

impl RootParameter {
    /// Whether this parameter declares a bindless table.
    pub fn is_bindless(&self) -> bool {
        matches!(
            self.kind,
            RootParameterKind::Table {
                count: BINDLESS_DESCRIPTOR_COUNT,
                ..
            }
        )
    }
}

/// Builds a [`RootSignature`] from declared bindings.
///
/// Register indices are sequential per (kind, space): the first SRV in
/// space 0 gets `t0`, the second `t1`, independent of CBVs in the same
/// space. `build` consumes the builder, so a signature is built exactly
/// once.
///
/// # Example
///
/// ```ignore
/// let mut builder = RootSignatureBuilder::new("lighting");
/// let scene_cb = builder.add_cbv_root_parameter("SCENE_CONSTANTS", 0);
/// let albedo = builder.add_srv_root_parameter("ALBEDO_TEXTURE", 0);
/// let sampler = builder.add_static_sampler(
///     "LINEAR_SAMPLER",
///     AddressMode::ClampToEdge,
///     FilterMode::Linear,
///     0,
/// );
/// let signature = builder.build();
/// ```
#[derive(Debug)]
pub struct RootSignatureBuilder {
    name: String,
    parameters: Vec<RootParameter>,
    /// Next register index per (kind, space).
    registers: HashMap<(RegisterKind, u32), u32>,
}

impl RootSignatureBuilder {
    /// Create a builder for a named root signature.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            registers: HashMap::new(),
        }
    }

    fn next_register(&mut self, kind: RegisterKind, space: u32) -> u32 {
        let counter = self.registers.entry((kind, space)).or_insert(0);
        let register = *counter;
        *counter += 1;
        register
    }

    fn push(
        &mut self,
        name: impl Into<String>,
        kind: RootParameterKind,
        register_kind: RegisterKind,
        space: u32,
    ) -> RootSignatureAllocation {
        let allocation = RootSignatureAllocation {
            parameter_index: self.parameters.len() as u32,
            register_index: self.next_register(register_kind, space),
            space,
            kind: register_kind,
        };
        self.parameters.push(RootParameter {
            name: name.into(),
            kind,
            allocation,
        });
        allocation
    }

    /// Declare a constant buffer view root parameter.
    pub fn add_cbv_root_parameter(
        &mut self,
        name: impl Into<String>,
        space: u32,
    ) -> RootSignatureAllocation {
        self.push(name, RootParameterKind::Cbv, RegisterKind::ConstantBuffer, space)
    }

    /// Declare a shader resource view root parameter.
    pub fn add_srv_root_parameter(
        &mut self,
        name: impl Into<String>,
        space: u32,
    ) -> RootSignatureAllocation {
        self.push(name, RootParameterKind::Srv, RegisterKind::ShaderResource, space)
    }

    /// Declare an unordered access view root parameter.
    pub fn add_uav_root_parameter(
        &mut self,
        name: impl Into<String>,
        space: u32,
    ) -> RootSignatureAllocation {
        self.push(name, RootParameterKind::Uav, RegisterKind::UnorderedAccess, space)
    }

    /// Declare a descriptor table root parameter.
    ///
    /// Pass [`BINDLESS_DESCRIPTOR_COUNT`] as `count` for an unbounded range.
    pub fn add_table_root_parameter(
        &mut self,
        name: impl Into<String>,
        range_type: RegisterKind,
        count: u32,
        space: u32,
    ) -> RootSignatureAllocation {
        self.push(
            name,
            RootParameterKind::Table { range_type, count },
            range_type,
            space,
        )
    }

    /// Declare a static sampler baked into the signature.
    pub fn add_static_sampler(
        &mut self,
        name: impl Into<String>,
        address_mode: AddressMode,
        filter_mode: FilterMode,
        space: u32,
    ) -> RootSignatureAllocation {
        self.push(
            name,
            RootParameterKind::StaticSampler {
                address_mode,
                filter_mode,
            },
            RegisterKind::Sampler,
            space,
        )
    }

    /// Declare inline root constants.
    pub fn add_constant_root_parameter(
        &mut self,
        name: impl Into<String>,
        dword_count: u32,
        space: u32,
    ) -> RootSignatureAllocation {
        self.push(
            name,
            RootParameterKind::Constants { dword_count },
            RegisterKind::ConstantBuffer,
            space,
        )
    }

    /// Build the immutable root signature.
    ///
    /// Produces one descriptor-set layout per register space up to the
    /// highest declared space; gap spaces get an empty layout so set indices
    /// line up with shader spaces.
    pub fn build(self) -> RootSignature {
        let max_space = self
            .parameters
            .iter()
            .map(|p| p.allocation.space)
            .max();
        let set_count = max_space.map(|s| s as usize + 1).unwrap_or(0);

        let mut set_layouts: Vec<Vec<RootParameter>> = vec![Vec::new(); set_count];
        for parameter in &self.parameters {
            set_layouts[parameter.allocation.space as usize].push(parameter.clone());
        }

        log::trace!(
            "Built root signature '{}': {} parameters, {} set layouts",
            self.name,
            self.parameters.len(),
            set_count
        );

        RootSignature {
            name: self.name,
            parameters: self.parameters,
            set_layouts,
        }
    }
}

/// An immutable, built root signature.
#[derive(Debug)]
pub struct RootSignature {
    name: String,
    parameters: Vec<RootParameter>,
    /// One layout per register space, gap spaces empty.
    set_layouts: Vec<Vec<RootParameter>>,
}

impl RootSignature {
    /// The signature name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All declared parameters, in declaration order.
    pub fn parameters(&self) -> &[RootParameter] {
        &self.parameters
    }

    /// Number of descriptor-set layouts (`max_space + 1`, including empty
    /// gap spaces).
    pub fn descriptor_set_count(&self) -> usize {
        self.set_layouts.len()
    }

    /// Parameters bound in the given register space.
    pub fn set_layout(&self, space: u32) -> &[RootParameter] {
        self.set_layouts
            .get(space as usize)
            .map(|l| l.as_slice())
            .unwrap_or(&[])
    }

    /// Look up a parameter by name.
    pub fn find(&self, name: &str) -> Option<&RootParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// The `#define` lines mapping every binding name to its register.
    ///
    /// Prepended to shader source at compile time so the shader binding
    /// contract follows the signature, not the other way round.
    pub fn register_macros(&self) -> String {
        let mut macros = String::new();
        for parameter in &self.parameters {
            // Static samplers and root constants still get macros so shaders
            // reference every slot by name.
            macros.push_str(&parameter.allocation.register_macro(&parameter.name));
            macros.push('\n');
        }
        macros
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_registers_per_kind_and_space() {
        let mut builder = RootSignatureBuilder::new("test");
        let cb0 = builder.add_cbv_root_parameter("CB0", 0);
        let cb1 = builder.add_cbv_root_parameter("CB1", 0);
        let srv0 = builder.add_srv_root_parameter("SRV0", 0);
        let cb_space1 = builder.add_cbv_root_parameter("CB_S1", 1);

        assert_eq!(cb0.register_index, 0);
        assert_eq!(cb1.register_index, 1);
        // SRVs count separately from CBVs
        assert_eq!(srv0.register_index, 0);
        // Spaces count separately too
        assert_eq!(cb_space1.register_index, 0);

        assert_eq!(cb0.parameter_index, 0);
        assert_eq!(cb1.parameter_index, 1);
        assert_eq!(srv0.parameter_index, 2);
        assert_eq!(cb_space1.parameter_index, 3);
    }

    #[test]
    fn test_sparse_spaces_produce_gap_layouts() {
        let mut builder = RootSignatureBuilder::new("sparse");
        builder.add_cbv_root_parameter("CB", 0);
        builder.add_srv_root_parameter("SRV", 2);
        let signature = builder.build();

        // Spaces {0, 2} declared, so 3 layouts with space 1 empty.
        assert_eq!(signature.descriptor_set_count(), 3);
        assert_eq!(signature.set_layout(0).len(), 1);
        assert!(signature.set_layout(1).is_empty());
        assert_eq!(signature.set_layout(2).len(), 1);
    }

    #[test]
    fn test_empty_signature() {
        let signature = RootSignatureBuilder::new("empty").build();
        assert_eq!(signature.descriptor_set_count(), 0);
        assert!(signature.parameters().is_empty());
        assert!(signature.register_macros().is_empty());
    }

    #[test]
    fn test_register_macros() {
        let mut builder = RootSignatureBuilder::new("macros");
        builder.add_cbv_root_parameter("SCENE_CONSTANTS", 0);
        builder.add_srv_root_parameter("ALBEDO_TEXTURE", 0);
        builder.add_srv_root_parameter("NORMAL_TEXTURE", 0);
        builder.add_static_sampler(
            "LINEAR_SAMPLER",
            AddressMode::ClampToEdge,
            FilterMode::Linear,
            0,
        );
        let signature = builder.build();

        let macros = signature.register_macros();
        assert!(macros.contains("#define SCENE_CONSTANTS register(b0, space0)"));
        assert!(macros.contains("#define ALBEDO_TEXTURE register(t0, space0)"));
        assert!(macros.contains("#define NORMAL_TEXTURE register(t1, space0)"));
        assert!(macros.contains("#define LINEAR_SAMPLER register(s0, space0)"));
    }

    #[test]
    fn test_bindless_table() {
        let mut builder = RootSignatureBuilder::new("bindless");
        builder.add_table_root_parameter(
            "ALL_TEXTURES",
            RegisterKind::ShaderResource,
            BINDLESS_DESCRIPTOR_COUNT,
            1,
        );
        let signature = builder.build();

        let parameter = signature.find("ALL_TEXTURES").unwrap();
        assert!(parameter.is_bindless());
        assert_eq!(signature.descriptor_set_count(), 2);
    }

    #[test]
    fn test_find_parameter() {
        let mut builder = RootSignatureBuilder::new("find");
        builder.add_constant_root_parameter("PUSH_DATA", 4, 0);
        let signature = builder.build();

        let parameter = signature.find("PUSH_DATA").unwrap();
        assert_eq!(
            parameter.kind,
            RootParameterKind::Constants { dword_count: 4 }
        );
        assert!(signature.find("MISSING").is_none());
    }
}
