//! Closed enumeration of trigger keys and mouse buttons
//!
//! Each entry carries the code every platform backend needs: the Win32
//! virtual-key code, the Linux evdev key code and the X11 keysym.

/// Platform codes of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    /// Canonical lowercase name used in the textual combo format
    pub name: &'static str,
    /// Human-readable label
    pub label: &'static str,
    pub vk: u16,
    pub evdev: u16,
    pub keysym: u32,
}

macro_rules! key_table {
    ($($variant:ident => $name:literal, $label:literal, $vk:literal, $evdev:literal, $keysym:literal;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Key {
            $($variant,)*
        }

        impl Key {
            pub const ALL: &'static [Key] = &[$(Key::$variant,)*];

            pub const fn spec(self) -> KeySpec {
                match self {
                    $(Key::$variant => KeySpec {
                        name: $name,
                        label: $label,
                        vk: $vk,
                        evdev: $evdev,
                        keysym: $keysym,
                    },)*
                }
            }
        }
    };
}

key_table! {
    A => "a", "A", 0x41, 30, 0x61;
    B => "b", "B", 0x42, 48, 0x62;
    C => "c", "C", 0x43, 46, 0x63;
    D => "d", "D", 0x44, 32, 0x64;
    E => "e", "E", 0x45, 18, 0x65;
    F => "f", "F", 0x46, 33, 0x66;
    G => "g", "G", 0x47, 34, 0x67;
    H => "h", "H", 0x48, 35, 0x68;
    I => "i", "I", 0x49, 23, 0x69;
    J => "j", "J", 0x4A, 36, 0x6a;
    K => "k", "K", 0x4B, 37, 0x6b;
    L => "l", "L", 0x4C, 38, 0x6c;
    M => "m", "M", 0x4D, 50, 0x6d;
    N => "n", "N", 0x4E, 49, 0x6e;
    O => "o", "O", 0x4F, 24, 0x6f;
    P => "p", "P", 0x50, 25, 0x70;
    Q => "q", "Q", 0x51, 16, 0x71;
    R => "r", "R", 0x52, 19, 0x72;
    S => "s", "S", 0x53, 31, 0x73;
    T => "t", "T", 0x54, 20, 0x74;
    U => "u", "U", 0x55, 22, 0x75;
    V => "v", "V", 0x56, 47, 0x76;
    W => "w", "W", 0x57, 17, 0x77;
    X => "x", "X", 0x58, 45, 0x78;
    Y => "y", "Y", 0x59, 21, 0x79;
    Z => "z", "Z", 0x5A, 44, 0x7a;
    Digit0 => "0", "0", 0x30, 11, 0x30;
    Digit1 => "1", "1", 0x31, 2, 0x31;
    Digit2 => "2", "2", 0x32, 3, 0x32;
    Digit3 => "3", "3", 0x33, 4, 0x33;
    Digit4 => "4", "4", 0x34, 5, 0x34;
    Digit5 => "5", "5", 0x35, 6, 0x35;
    Digit6 => "6", "6", 0x36, 7, 0x36;
    Digit7 => "7", "7", 0x37, 8, 0x37;
    Digit8 => "8", "8", 0x38, 9, 0x38;
    Digit9 => "9", "9", 0x39, 10, 0x39;
    F1 => "f1", "F1", 0x70, 59, 0xffbe;
    F2 => "f2", "F2", 0x71, 60, 0xffbf;
    F3 => "f3", "F3", 0x72, 61, 0xffc0;
    F4 => "f4", "F4", 0x73, 62, 0xffc1;
    F5 => "f5", "F5", 0x74, 63, 0xffc2;
    F6 => "f6", "F6", 0x75, 64, 0xffc3;
    F7 => "f7", "F7", 0x76, 65, 0xffc4;
    F8 => "f8", "F8", 0x77, 66, 0xffc5;
    F9 => "f9", "F9", 0x78, 67, 0xffc6;
    F10 => "f10", "F10", 0x79, 68, 0xffc7;
    F11 => "f11", "F11", 0x7A, 87, 0xffc8;
    F12 => "f12", "F12", 0x7B, 88, 0xffc9;
    Space => "space", "Space", 0x20, 57, 0x20;
    Tab => "tab", "Tab", 0x09, 15, 0xff09;
    Enter => "enter", "Enter", 0x0D, 28, 0xff0d;
    Escape => "escape", "Escape", 0x1B, 1, 0xff1b;
    Backspace => "backspace", "Backspace", 0x08, 14, 0xff08;
    Delete => "delete", "Delete", 0x2E, 111, 0xffff;
    Insert => "insert", "Insert", 0x2D, 110, 0xff63;
    Home => "home", "Home", 0x24, 102, 0xff50;
    End => "end", "End", 0x23, 107, 0xff57;
    PageUp => "pageup", "Page Up", 0x21, 104, 0xff55;
    PageDown => "pagedown", "Page Down", 0x22, 109, 0xff56;
    Up => "up", "Up", 0x26, 103, 0xff52;
    Down => "down", "Down", 0x28, 108, 0xff54;
    Left => "left", "Left", 0x25, 105, 0xff51;
    Right => "right", "Right", 0x27, 106, 0xff53;
}

impl Key {
    /// Parse a key name, accepting common aliases
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let canonical = match lower.as_str() {
            "return" => "enter",
            "esc" => "escape",
            "del" => "delete",
            "ins" => "insert",
            "pgup" | "page_up" | "prior" => "pageup",
            "pgdn" | "page_down" | "next" => "pagedown",
            "spacebar" => "space",
            other => other,
        };
        Self::ALL.iter().copied().find(|key| key.spec().name == canonical)
    }

    pub fn from_vk(vk: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.spec().vk == vk)
    }

    pub fn from_evdev(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.spec().evdev == code)
    }

    pub fn from_keysym(keysym: u32) -> Option<Self> {
        // Keysyms for letters are case-sensitive, the table stores lowercase
        let keysym = if (0x41..=0x5a).contains(&keysym) { keysym + 0x20 } else { keysym };
        Self::ALL.iter().copied().find(|key| key.spec().keysym == keysym)
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn label(self) -> &'static str {
        self.spec().label
    }
}

/// Mouse buttons usable as a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Middle,
    /// First side button ("back", XBUTTON1)
    Side1,
    /// Second side button ("forward", XBUTTON2)
    Side2,
}

impl MouseButton {
    pub const ALL: &'static [MouseButton] = &[Self::Middle, Self::Side1, Self::Side2];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "middle" | "mouse3" | "middle_click" => Some(Self::Middle),
            "mouse4" | "side1" | "xbutton1" | "back" => Some(Self::Side1),
            "mouse5" | "side2" | "xbutton2" | "forward" => Some(Self::Side2),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Middle => "middle",
            Self::Side1 => "mouse4",
            Self::Side2 => "mouse5",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Middle => "Middle Click",
            Self::Side1 => "Mouse 4",
            Self::Side2 => "Mouse 5",
        }
    }

    /// Win32 virtual-key code (VK_MBUTTON, VK_XBUTTON1, VK_XBUTTON2)
    pub fn vk(self) -> u16 {
        match self {
            Self::Middle => 0x04,
            Self::Side1 => 0x05,
            Self::Side2 => 0x06,
        }
    }

    /// evdev code (BTN_MIDDLE, BTN_SIDE, BTN_EXTRA)
    pub fn evdev(self) -> u16 {
        match self {
            Self::Middle => 274,
            Self::Side1 => 275,
            Self::Side2 => 276,
        }
    }

    pub fn from_evdev(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|button| button.evdev() == code)
    }

    /// X11 core protocol button number
    pub fn x11_button(self) -> u8 {
        match self {
            Self::Middle => 2,
            Self::Side1 => 8,
            Self::Side2 => 9,
        }
    }

    pub fn from_x11_button(button: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.x11_button() == button)
    }
}
