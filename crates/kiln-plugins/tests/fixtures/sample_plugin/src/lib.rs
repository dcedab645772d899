//! Test fixture: a minimal Kiln extension module with one registrable
//! entry point and one helper declaration.

use kiln_plugin_api::{ComponentError, PluginComponent, declare_plugins};

#[derive(Default)]
pub struct Beacon {
    frames_seen: u64,
}

impl PluginComponent for Beacon {
    fn on_attach(&mut self) -> Result<(), ComponentError> {
        self.frames_seen = 0;
        Ok(())
    }

    fn on_update(&mut self, _frame: u64) {
        self.frames_seen += 1;
    }
}

#[derive(Default)]
pub struct Helper;

impl PluginComponent for Helper {}

declare_plugins! {
    beacon_ctor => Beacon {
        id: "com.kiln.sample.beacon",
        name: "Sample Beacon",
        version: "0.1.0",
    }
    helper_ctor => Helper {
        id: "",
        name: "Sample Helper",
        version: "0.1.0",
    }
}
