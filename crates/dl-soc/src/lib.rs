//! Static per-SoC configuration keyed by the 16-bit hardware code.

/// Immutable per-SoC record.
///
/// `hw_ver` is not part of this table; it is read from the device at
/// connect time and overlaid on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipInfo {
    pub hw_code: u16,
    pub chip_name: &'static str,
    pub description: &'static str,
    pub watchdog_addr: u32,
    pub uart_addr: u32,
    pub brom_payload_addr: u32,
    pub da_payload_addr: u32,
    pub cq_dma_base: Option<u32>,
}

/// Value written to the watchdog mode register to stop it.
pub const WATCHDOG_DISABLE: u32 = 0x2200_0064;

/// Legacy SoCs whose watchdog is stopped with a 16-bit write instead.
pub const LEGACY_WATCHDOG_HW_CODES: [u16; 4] = [0x6261, 0x2523, 0x7682, 0x7686];
pub const LEGACY_WATCHDOG_ADDR: u32 = 0xA205_0000;
pub const LEGACY_WATCHDOG_VALUE: u16 = 0x2200;

#[must_use]
pub fn is_legacy_watchdog(hw_code: u16) -> bool {
    LEGACY_WATCHDOG_HW_CODES.contains(&hw_code)
}

/// Look up a chip by hardware code.
#[must_use]
pub fn by_hw_code(hw_code: u16) -> Option<&'static ChipInfo> {
    CHIPS.iter().find(|c| c.hw_code == hw_code)
}

macro_rules! chip {
    ($hw:literal, $name:literal, $desc:literal, wdt = $wdt:literal, uart = $uart:literal, brom = $brom:literal, da = $da:literal $(, cqdma = $cqdma:literal)?) => {
        ChipInfo {
            hw_code: $hw,
            chip_name: $name,
            description: $desc,
            watchdog_addr: $wdt,
            uart_addr: $uart,
            brom_payload_addr: $brom,
            da_payload_addr: $da,
            cq_dma_base: chip!(@cqdma $($cqdma)?),
        }
    };
    (@cqdma) => { None };
    (@cqdma $cqdma:literal) => { Some($cqdma) };
}

pub static CHIPS: &[ChipInfo] = &[
    chip!(0x0279, "mt6797", "Helio X20/X25", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x200000),
    chip!(0x0321, "mt6735", "entry 64-bit LTE", wdt = 0x10212000, uart = 0x11002000, brom = 0x100A00, da = 0x200000, cqdma = 0x10217C00),
    chip!(0x0335, "mt6737m", "entry 64-bit LTE", wdt = 0x10212000, uart = 0x11002000, brom = 0x100A00, da = 0x200000, cqdma = 0x10217C00),
    chip!(0x0551, "mt6757", "Helio P20", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x200000),
    chip!(0x0690, "mt6763", "Helio P23", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x201000, cqdma = 0x10212000),
    chip!(0x0699, "mt6739", "entry quad-core", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x201000, cqdma = 0x10212000),
    chip!(0x0707, "mt6768", "Helio P65/G85", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x201000, cqdma = 0x10212000),
    chip!(0x0717, "mt6761", "Helio A22", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x201000, cqdma = 0x10212000),
    chip!(0x0766, "mt6765", "Helio P35", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x201000, cqdma = 0x10212000),
    chip!(0x0788, "mt6771", "Helio P60", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x201000, cqdma = 0x10212C00),
    chip!(0x0813, "mt6785", "Helio G90", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x201000, cqdma = 0x10212000),
    chip!(0x0886, "mt6873", "Dimensity 800", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x201000, cqdma = 0x10212000),
    chip!(0x0989, "mt6893", "Dimensity 1200", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x201000, cqdma = 0x10212000),
    chip!(0x2523, "mt2523", "wearable platform", wdt = 0xA2050000, uart = 0xA0080000, brom = 0x100A00, da = 0x200000),
    chip!(0x6261, "mt6261", "feature phone", wdt = 0xA2050000, uart = 0xA0080000, brom = 0x100A00, da = 0x200000),
    chip!(0x6572, "mt6572", "entry dual-core", wdt = 0x10007000, uart = 0x11005000, brom = 0x100A00, da = 0x2007000),
    chip!(0x6580, "mt6580", "entry quad-core 3G", wdt = 0x10007000, uart = 0x11005000, brom = 0x100A00, da = 0x200000),
    chip!(0x6582, "mt6582", "entry quad-core", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x200000),
    chip!(0x7682, "mt7682", "IoT platform", wdt = 0xA2050000, uart = 0xA0080000, brom = 0x100A00, da = 0x200000),
    chip!(0x7686, "mt7686", "IoT platform", wdt = 0xA2050000, uart = 0xA0080000, brom = 0x100A00, da = 0x200000),
    chip!(0x8127, "mt8127", "tablet quad-core", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x200000),
    chip!(0x8163, "mt8163", "tablet quad-core", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x200000),
    chip!(0x8173, "mt8173", "tablet big.LITTLE", wdt = 0x10007000, uart = 0x11002000, brom = 0x100A00, da = 0x200000),
];
