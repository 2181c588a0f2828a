//! Table of supported braille displays.
//!
//! The table is ordered; the first profile whose name patterns match a paired
//! device is the one used for it. Insecure links are used only for families
//! known to drop or refuse authenticated connections.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use crate::types::{DeviceProfile, NamePattern};

static SUPPORTED_PROFILES: LazyLock<Vec<Arc<DeviceProfile>>> = LazyLock::new(|| {
    build_profiles().into_iter().map(Arc::new).collect()
});

/// Every supported display profile, in matching order.
pub fn supported_profiles() -> &'static [Arc<DeviceProfile>] {
    &SUPPORTED_PROFILES
}

/// Builder for key-name → friendly-name maps.
#[derive(Debug, Default)]
pub struct KeyNames(BTreeMap<String, String>);

impl KeyNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, key: &str, friendly: &str) -> Self {
        self.0.insert(key.to_string(), friendly.to_string());
        self
    }

    pub fn dots6(self) -> Self {
        (1..=6).fold(self, |names, dot| {
            names.add(&format!("Dot{dot}"), &format!("Dot {dot}"))
        })
    }

    pub fn dots8(self) -> Self {
        self.dots6().add("Dot7", "Dot 7").add("Dot8", "Dot 8")
    }

    pub fn routing(self) -> Self {
        self.add("RoutingKey", "Routing key")
    }

    pub fn dual_joysticks(self) -> Self {
        self.add("LeftJoystickLeft", "Left joystick left")
            .add("LeftJoystickRight", "Left joystick right")
            .add("LeftJoystickUp", "Left joystick up")
            .add("LeftJoystickDown", "Left joystick down")
            .add("LeftJoystickPress", "Left joystick center")
            .add("RightJoystickLeft", "Right joystick left")
            .add("RightJoystickRight", "Right joystick right")
            .add("RightJoystickUp", "Right joystick up")
            .add("RightJoystickDown", "Right joystick down")
            .add("RightJoystickPress", "Right joystick center")
    }

    fn joystick(self) -> Self {
        self.add("Left", "Joystick left")
            .add("Right", "Joystick right")
            .add("Up", "Joystick up")
            .add("Down", "Joystick down")
            .add("Press", "Joystick center")
    }

    fn display_keys(self) -> Self {
        (1..=6).fold(self, |names, n| {
            names.add(&format!("Display{n}"), &format!("Display key {n}"))
        })
    }

    pub fn build(self) -> BTreeMap<String, String> {
        self.0
    }
}

fn build_profiles() -> Vec<DeviceProfile> {
    let handy_tech_models = [
        "Braille Wave BRW",
        "Braille Wave",
        "Braillino BL2",
        "Braillino",
        "Braille Star 40 BS4",
        "Braille Star 40",
        "Easy Braille EBR",
        "Easy Braille",
        "Active Braille AB4",
        "Active Braille",
        "Basic Braille BB3",
        "Basic Braille BB4",
        "Basic Braille BB6",
        "Basic Braille BB",
    ];
    let handy_tech_short_models = [
        "BRW", "BL2", "BS4", "EBR", "AB4", "BB3", "BB4", "BB6", "BB",
    ];

    vec![
        DeviceProfile::new("BraillePen", "vo")
            .with_key_names(
                KeyNames::new()
                    .dots6()
                    .add("Shift", "Shift")
                    .add("Space", "Space")
                    .add("Control", "Control")
                    .add("JoystickLeft", "Joystick left")
                    .add("JoystickRight", "Joystick right")
                    .add("JoystickUp", "Joystick up")
                    .add("JoystickDown", "Joystick down")
                    .add("JoystickEnter", "Joystick center")
                    .add("ScrollLeft", "Scroll left")
                    .add("ScrollRight", "Scroll right")
                    .build(),
            )
            .with_pattern(NamePattern::prefix("EL12-")),
        DeviceProfile::new("Esys", "eu")
            .with_key_names(
                KeyNames::new()
                    .dots8()
                    .add("Switch1Left", "Left switch")
                    .add("Switch1Right", "Right switch")
                    .dual_joysticks()
                    .add("Backspace", "Backspace")
                    .add("Space", "Space")
                    .add("RoutingKey1", "Routing key")
                    .build(),
            )
            .with_pattern(NamePattern::prefix("Esys-")),
        DeviceProfile::new("Focus", "fs")
            .with_key_names(
                KeyNames::new()
                    .dots8()
                    .add("Space", "Space")
                    .add("LeftAdvance", "Left advance bar")
                    .add("RightAdvance", "Right advance bar")
                    .add("LeftWheelPress", "Left wheel press")
                    .add("LeftWheelDown", "Left wheel down")
                    .add("LeftWheelUp", "Left wheel up")
                    .add("RightWheelPress", "Right wheel press")
                    .add("RightWheelDown", "Right wheel down")
                    .add("RightWheelUp", "Right wheel up")
                    .routing()
                    .add("LeftShift", "Left shift")
                    .add("RightShift", "Right shift")
                    .add("LeftGdf", "Left selector")
                    .add("RightGdf", "Right selector")
                    .add("LeftRockerUp", "Left rocker up")
                    .add("LeftRockerDown", "Left rocker down")
                    .add("RightRockerUp", "Right rocker up")
                    .add("RightRockerDown", "Right rocker down")
                    .build(),
            )
            .with_pattern(NamePattern::prefix("Focus 40 BT"))
            .with_pattern(NamePattern::prefix("Focus 14 BT")),
        DeviceProfile::new("Brailliant", "hw")
            .connect_securely(false)
            .with_key_names(
                KeyNames::new()
                    .dots8()
                    .routing()
                    .add("Space", "Space")
                    .add("Power", "Power")
                    .display_keys()
                    .add("Thumb1", "Thumb key 1")
                    .add("Thumb2", "Thumb key 2")
                    .add("Thumb3", "Thumb key 3")
                    .add("Thumb4", "Thumb key 4")
                    .build(),
            )
            .with_pattern(NamePattern::prefix("Brailliant BI")),
        DeviceProfile::new("HIMS", "hm")
            .connect_securely(false)
            .with_key_names(
                KeyNames::new()
                    .dots8()
                    .routing()
                    .add("Space", "Space")
                    .add("F1", "F1")
                    .add("F2", "F2")
                    .add("F3", "F3")
                    .add("F4", "F4")
                    .add("Backward", "Backward")
                    .add("Forward", "Forward")
                    .build(),
            )
            .with_pattern(NamePattern::prefix("Hansone"))
            .with_pattern(NamePattern::prefix("HansoneXL"))
            .with_pattern(NamePattern::prefix("BrailleSense"))
            .with_pattern(NamePattern::prefix("BrailleEDGE"))
            .with_pattern(NamePattern::prefix("SmartBeetle")),
        DeviceProfile::new("Refreshabraille", "bm")
            .connect_securely(false)
            .with_key_names(baum_key_names())
            .with_pattern(NamePattern::prefix("Refreshabraille")),
        DeviceProfile::new("VarioConnect", "bm")
            .connect_securely(false)
            .with_key_names(baum_key_names())
            .with_pattern(NamePattern::prefix("VarioConnect")),
        DeviceProfile::new("HWG Brailliant", "bm")
            .connect_securely(false)
            .with_key_names(KeyNames::new().display_keys().routing().build())
            .with_pattern(NamePattern::prefix("HWG Brailliant")),
        DeviceProfile::new("Braillex Trio", "pm")
            .with_key_names(
                KeyNames::new()
                    .dots8()
                    .add("LeftSpace", "Space")
                    .add("RightSpace", "Space")
                    .add("Space", "Space")
                    .add("LeftThumb", "Left thumb key")
                    .add("RightThumb", "Right thumb key")
                    .add("RoutingKey1", "Routing key")
                    .add("BarLeft1", "Bar left 1")
                    .add("BarLeft2", "Bar left 2")
                    .add("BarRight1", "Bar right 1")
                    .add("BarRight2", "Bar right 2")
                    .add("BarUp1", "Bar up 1")
                    .add("BarUp2", "Bar up 2")
                    .add("BarDown1", "Bar down 1")
                    .add("BarDown2", "Bar down 2")
                    .add("LeftKeyRear", "Left rear key")
                    .add("LeftKeyFront", "Left front key")
                    .add("RightKeyRear", "Right rear key")
                    .add("RightKeyFront", "Right front key")
                    .build(),
            )
            .with_pattern(NamePattern::prefix("braillex trio")),
        DeviceProfile::new("Alva BC", "al")
            .connect_securely(false)
            .with_key_names(
                // No braille dot keys.
                KeyNames::new()
                    .add("ETouchLeftRear", "Left rear eTouch")
                    .add("ETouchRightRear", "Right rear eTouch")
                    .add("ETouchLeftFront", "Left front eTouch")
                    .add("ETouchRightFront", "Right front eTouch")
                    .add("SmartpadF1", "Smartpad F1")
                    .add("SmartpadF2", "Smartpad F2")
                    .add("SmartpadF3", "Smartpad F3")
                    .add("SmartpadF4", "Smartpad F4")
                    .add("SmartpadUp", "Smartpad up")
                    .add("SmartpadDown", "Smartpad down")
                    .add("SmartpadLeft", "Smartpad left")
                    .add("SmartpadRight", "Smartpad right")
                    .add("SmartpadEnter", "Smartpad enter")
                    .add("ThumbLeft", "Left thumb key")
                    .add("ThumbRight", "Right thumb key")
                    .add("ThumbUp", "Up thumb key")
                    .add("ThumbDown", "Down thumb key")
                    .add("ThumbHome", "Home thumb key")
                    .add("RoutingKey1", "Routing key")
                    .build(),
            )
            .with_pattern(NamePattern::prefix_ignore_case("Alva BC")),
        DeviceProfile::new("HandyTech", "ht")
            .with_key_names(
                KeyNames::new()
                    .add("B4", "Dot 1")
                    .add("B3", "Dot 2")
                    .add("B2", "Dot 3")
                    .add("B1", "Dot 7")
                    .add("B5", "Dot 4")
                    .add("B6", "Dot 5")
                    .add("B7", "Dot 6")
                    .add("B8", "Dot 8")
                    .routing()
                    .add("LeftRockerTop", "Left triple action key top")
                    .add("LeftRockerBottom", "Left triple action key bottom")
                    .add(
                        "LeftRockerTop+LeftRockerBottom",
                        "Left triple action key middle",
                    )
                    .add("RightRockerTop", "Right triple action key top")
                    .add("RightRockerBottom", "Right triple action key bottom")
                    .add(
                        "RightRockerTop+RightRockerBottom",
                        "Right triple action key middle",
                    )
                    .add("SpaceLeft", "Left space")
                    .add("SpaceRight", "Right space")
                    .display_keys()
                    .build(),
            )
            .with_pattern(NamePattern::serial_numbered(handy_tech_models))
            .with_pattern(NamePattern::serial_numbered(handy_tech_short_models)),
        DeviceProfile::new("Seika Mini", "sk")
            .connect_securely(false)
            .with_key_names(
                KeyNames::new()
                    .dots8()
                    .routing()
                    .dual_joysticks()
                    .add("Backspace", "Backspace")
                    .add("Space", "Space")
                    .add("LeftButton", "Pan left")
                    .add("RightButton", "Pan right")
                    .build(),
            )
            .with_pattern(NamePattern::prefix("TSM")),
        DeviceProfile::new("Seika", "sk")
            .with_key_names(
                // No braille dot keys.
                KeyNames::new()
                    .add("K1", "Pan left")
                    .add("K8", "Pan right")
                    .add("K2", "Left rocker left")
                    .add("K3", "Left rocker right")
                    .add("K4", "Left long key")
                    .add("K5", "Right long key")
                    .add("K6", "Right rocker left")
                    .add("K7", "Right rocker right")
                    .add("RoutingKey2", "Routing key")
                    .routing()
                    .build(),
            )
            .with_pattern(NamePattern::prefix("TS5")),
    ]
}

fn baum_key_names() -> BTreeMap<String, String> {
    KeyNames::new()
        .dots8()
        .joystick()
        .routing()
        .add("Display2", "Advance left")
        .add("Display5", "Advance right")
        .add("B9", "Space")
        .add("B10", "Space")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PairedDevice;
    use braillink_core::BluetoothAddress;
    use rstest::rstest;

    fn first_match(name: &str) -> Option<(&'static str, bool)> {
        let device = PairedDevice::new(BluetoothAddress::new("00:11:22:33:44:55").unwrap(), name);
        supported_profiles()
            .iter()
            .find(|p| p.matches(&device))
            .map(|p| (p.driver_code.as_str(), p.connect_securely))
    }

    #[rstest]
    #[case("EL12-1234", Some(("vo", true)))]
    #[case("Esys-40 0012", Some(("eu", true)))]
    #[case("Focus 40 BT", Some(("fs", true)))]
    #[case("Focus 14 BT 0001", Some(("fs", true)))]
    #[case("Focus 80 BT", None)]
    #[case("Brailliant BI 40", Some(("hw", false)))]
    #[case("BrailleSense U2", Some(("hm", false)))]
    #[case("SmartBeetle", Some(("hm", false)))]
    #[case("Refreshabraille 18", Some(("bm", false)))]
    #[case("VarioConnect 24", Some(("bm", false)))]
    #[case("HWG Brailliant 40", Some(("bm", false)))]
    #[case("braillex trio", Some(("pm", true)))]
    #[case("ALVA BC640", Some(("al", false)))]
    #[case("Active Braille AB4/S1-00001", Some(("ht", true)))]
    #[case("BS4/A2-12345", Some(("ht", true)))]
    #[case("Active Braille AB4", None)]
    #[case("TSM40", Some(("sk", false)))]
    #[case("TS5 Braille", Some(("sk", true)))]
    #[case("Headphones", None)]
    fn test_profile_table_matching(#[case] name: &str, #[case] expected: Option<(&str, bool)>) {
        assert_eq!(first_match(name), expected);
    }

    #[test]
    fn test_every_profile_uses_serial_port_service() {
        for profile in supported_profiles() {
            assert_eq!(
                profile.service_uuid,
                braillink_core::constants::SERIAL_PORT_SERVICE_UUID
            );
            assert!(!profile.name_patterns.is_empty(), "{}", profile.label);
            assert!(!profile.friendly_key_names.is_empty(), "{}", profile.label);
        }
    }

    #[test]
    fn test_key_name_helpers() {
        let names = KeyNames::new().dots8().routing().build();
        assert_eq!(names.len(), 9);
        assert_eq!(names["Dot8"], "Dot 8");
        assert_eq!(names["RoutingKey"], "Routing key");
    }
}
