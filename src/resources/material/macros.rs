//! Material declaration macro.

/// Declares a material type.
///
/// Generates the struct with one [`Property`](crate::resources::material::Property)
/// per uniform and one [`TextureProperty`](crate::resources::material::TextureProperty)
/// per texture, `new`/`with_shader` constructors that load the shader through
/// the renderer, getters and `set_*` setters, and the
/// [`Material`](crate::resources::material::Material) implementation.
///
/// ```rust,ignore
/// define_material! {
///     /// Flat color.
///     pub struct SimpleColorMaterial {
///         shader: "simple_color",
///         flags: MaterialFlags::TRANSFORM,
///         lighted: false,
///         uniforms: [
///             /// Surface color.
///             color: Vec4 = ("u_Material.Color", Vec4::ONE),
///         ],
///         textures: [],
///     }
/// }
/// ```
#[macro_export]
macro_rules! define_material {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            shader: $shader:literal,
            flags: $flags:expr,
            lighted: $lighted:expr,
            uniforms: [
                $( $(#[$u_meta:meta])* $u_field:ident: $u_type:ty = ($u_name:literal, $u_default:expr) ),* $(,)?
            ],
            textures: [
                $( $(#[$t_meta:meta])* $t_field:ident = $t_name:literal ),* $(,)?
            ] $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            base: $crate::resources::material::MaterialBase,
            $( $u_field: $crate::resources::material::Property<$u_type>, )*
            $( $t_field: $crate::resources::material::TextureProperty, )*
        }

        impl $name {
            /// Shader used by [`Self::new`].
            pub const SHADER: &'static str = $shader;

            pub fn new(renderer: &$crate::renderer::Renderer) -> $crate::errors::Result<Self> {
                Self::with_shader(renderer, Self::SHADER)
            }

            /// Builds the material over another shader with the same
            /// interface.
            pub fn with_shader(
                renderer: &$crate::renderer::Renderer,
                shader: &str,
            ) -> $crate::errors::Result<Self> {
                let shader = renderer.load_shader(shader)?;
                Ok(Self {
                    base: $crate::resources::material::MaterialBase::new(shader, $flags, $lighted),
                    $( $u_field: $crate::resources::material::Property::new($u_name, $u_default), )*
                    $( $t_field: $crate::resources::material::TextureProperty::new($t_name), )*
                })
            }

            $(
                $crate::__paste::paste! {
                    $(#[$u_meta])*
                    pub fn [<set_ $u_field>](&self, value: $u_type) {
                        self.$u_field.set(value);
                    }
                }

                #[must_use]
                pub fn $u_field(&self) -> $u_type {
                    self.$u_field.get()
                }
            )*

            $(
                $crate::__paste::paste! {
                    $(#[$t_meta])*
                    pub fn [<set_ $t_field>](&self, texture: std::rc::Rc<dyn $crate::renderer::texture::Texture>) {
                        self.$t_field.set(Some(texture));
                    }
                }

                #[must_use]
                pub fn $t_field(&self) -> Option<std::rc::Rc<dyn $crate::renderer::texture::Texture>> {
                    self.$t_field.get()
                }
            )*
        }

        impl $crate::resources::material::Material for $name {
            fn base(&self) -> &$crate::resources::material::MaterialBase {
                &self.base
            }

            fn set_material_properties(&self) {
                $( self.$u_field.apply(&self.base); )*
                $( self.$t_field.apply(&self.base); )*
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
    };
}
