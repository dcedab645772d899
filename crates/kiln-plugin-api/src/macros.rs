//! Export macro for plugin authors.

/// Declares the entry points of a plugin library and generates every symbol
/// the host's loader expects: the ABI-version export, the manifest export,
/// and one constructor per entry.
///
/// Invoke once, at the crate root of a `cdylib`, with the entry types in
/// scope by their bare names (the generated qualified name is
/// `module_path!() + "::" + type name`). Entry types must implement
/// [`PluginComponent`](crate::PluginComponent) and `Default`.
///
/// Entries whose `id` is the empty string are treated by the host as
/// helper/abstract declarations and are never registered or instantiated.
///
/// ```ignore
/// use kiln_plugin_api::{PluginComponent, declare_plugins};
///
/// #[derive(Default)]
/// struct HudOverlay;
///
/// impl PluginComponent for HudOverlay {}
///
/// declare_plugins! {
///     hud_overlay_ctor => HudOverlay {
///         id: "com.example.hud",
///         name: "HUD Overlay",
///         version: "0.3.1",
///     }
/// }
/// ```
#[macro_export]
macro_rules! declare_plugins {
    ( $( $sym:ident => $ty:ty {
            id: $id:literal,
            name: $name:literal,
            version: $version:literal $(,)?
        } )+ ) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn kiln_abi_version() -> u32 {
            $crate::KILN_ABI_VERSION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn kiln_plugin_manifest() -> *const $crate::RawManifest {
            const ENTRIES: &[$crate::RawEntryDescriptor] = &[
                $(
                    $crate::RawEntryDescriptor {
                        qualified_name: concat!(
                            module_path!(), "::", stringify!($ty), "\0"
                        ).as_ptr().cast(),
                        id: concat!($id, "\0").as_ptr().cast(),
                        name: concat!($name, "\0").as_ptr().cast(),
                        version: concat!($version, "\0").as_ptr().cast(),
                        ctor_symbol: concat!(stringify!($sym), "\0").as_ptr().cast(),
                    },
                )+
            ];
            static MANIFEST: $crate::RawManifest = $crate::RawManifest {
                abi_version: $crate::KILN_ABI_VERSION,
                entry_count: ENTRIES.len(),
                entries: ENTRIES.as_ptr(),
            };
            &MANIFEST
        }

        $(
            #[unsafe(no_mangle)]
            #[allow(improper_ctypes_definitions)]
            pub extern "C" fn $sym() -> *mut dyn $crate::PluginComponent {
                let component: Box<dyn $crate::PluginComponent> =
                    Box::new(<$ty as ::core::default::Default>::default());
                Box::into_raw(component)
            }
        )+
    };
}
