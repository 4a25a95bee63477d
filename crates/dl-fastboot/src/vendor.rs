//! Huawei/Honor vendor layer: a fixed OEM/getvar sweep normalised into
//! one device-information record.

use crate::{FastbootClient, Result};

const HONOR_PREFIXES: [&str; 9] = [
    "honor", "hra-", "any-", "dra-", "jat-", "lld-", "bkk-", "pct-", "stk-",
];

const HUAWEI_PREFIXES: [&str; 9] = [
    "huawei", "hwa-", "vog-", "ele-", "mar-", "ana-", "nop-", "tas-", "was-",
];

/// Flat record of everything the bootloader will tell us.
#[derive(Debug, Clone, Default)]
pub struct HuaweiHonorDeviceInfo {
    pub product_model: String,
    pub device_model: String,
    pub build_number: String,
    pub system_version: String,
    pub base_version: String,
    pub custom_version: String,
    pub preload_version: String,
    pub imei1: String,
    pub imei2: String,
    pub meid: String,
    pub bl_lock_status: String,
    pub battery_info: String,
    pub hw_key_version: String,
    pub rescue_version: String,
    pub software_info: String,
    pub update_state: String,
    pub vendor_country: String,
    pub is_huawei: bool,
    pub is_honor: bool,
    pub is_unlocked: bool,
}

/// IMEI/MEID triple out of a `get-psid` transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PsidInfo {
    pub imei1: String,
    pub imei2: String,
    pub meid: String,
}

/// Parse the `(bootloader) IMEI:` / `IMEI1:` / `MEID:` lines of a PSID
/// reply. Values are CRLF-trimmed and upper-cased.
#[must_use]
pub fn parse_psid(raw: &str) -> PsidInfo {
    let mut info = PsidInfo::default();

    for segment in raw.split("(bootloader)") {
        for line in segment.split(['\r', '\n']) {
            let line = line.trim().trim_matches('\0').trim();
            // IMEI1: must be tried before the IMEI: prefix it contains
            if let Some(value) = line.strip_prefix("IMEI1:") {
                info.imei2 = value.trim().to_uppercase();
            } else if let Some(value) = line.strip_prefix("IMEI:") {
                info.imei1 = value.trim().to_uppercase();
            } else if let Some(value) = line.strip_prefix("MEID:") {
                info.meid = value.trim().to_uppercase();
            }
        }
    }

    info
}

/// Single-pass recogniser for bootloader-prefixed value replies.
///
/// Handles both historical formats (the dotted `...\r\n(bootloader)`
/// form and the `(bootloader) :` form) by collecting every candidate
/// run and returning the longest one that is not a terminal token.
#[must_use]
pub fn parse_bootloader_value(raw: &str) -> Option<String> {
    raw.replace("(bootloader)", "\n")
        .split(['\r', '\n'])
        .map(|line| {
            line.trim()
                .trim_start_matches(':')
                .trim_end_matches('.')
                .trim_matches('\0')
                .trim()
        })
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            !line.is_empty() && lower != "okay" && lower != "ok" && lower != "finished"
        })
        .max_by_key(|line| line.len())
        .map(str::to_string)
}

/// Classify by model-string prefix; Honor wins over Huawei and the two
/// flags are mutually exclusive.
#[must_use]
pub fn detect_brand(
    product_model: &str,
    device_model: &str,
    software_info: &str,
) -> (bool, bool) {
    let fields = [
        product_model.to_lowercase(),
        device_model.to_lowercase(),
        software_info.to_lowercase(),
    ];

    let matches = |prefixes: &[&str]| {
        fields
            .iter()
            .any(|field| prefixes.iter().any(|prefix| field.starts_with(prefix)))
    };

    if matches(&HONOR_PREFIXES) {
        (true, false)
    } else if matches(&HUAWEI_PREFIXES) {
        (false, true)
    } else {
        (false, false)
    }
}

/// Runs the fixed command sweep and assembles the record. Every field
/// is best-effort: a failing or unparseable reply is logged and left
/// empty.
pub struct VendorAdapter<'a> {
    client: &'a FastbootClient,
}

impl<'a> VendorAdapter<'a> {
    #[must_use]
    pub fn new(client: &'a FastbootClient) -> Self {
        Self { client }
    }

    fn oem_value(&self, command: &str) -> String {
        match self.client.oem(command) {
            Ok(raw) => parse_bootloader_value(&raw).unwrap_or_else(|| {
                log::debug!("oem {command}: no value recognised in {raw:?}");
                String::new()
            }),
            Err(e) => {
                log::debug!("oem {command} failed: {e}");
                String::new()
            }
        }
    }

    fn var_value(&self, name: &str) -> String {
        match self.client.get_var(name) {
            Ok(value) => value.trim().to_string(),
            Err(e) => {
                log::debug!("getvar {name} failed: {e}");
                String::new()
            }
        }
    }

    pub fn collect(&self) -> Result<HuaweiHonorDeviceInfo> {
        let mut info = HuaweiHonorDeviceInfo {
            product_model: self.oem_value("get-product-model"),
            build_number: self.oem_value("get-build-number"),
            bl_lock_status: self.oem_value("get-bootinfo"),
            system_version: self.oem_value("oeminforead-SYSTEM_VERSION"),
            base_version: self.oem_value("oeminforead-BASE_VERSION"),
            custom_version: self.oem_value("oeminforead-CUSTOM_VERSION"),
            preload_version: self.oem_value("oeminforead-PRELOAD_VERSION"),
            battery_info: self.oem_value("get-battery-info"),
            hw_key_version: self.oem_value("get-hwkey-version"),
            device_model: self.var_value("devicemodel"),
            vendor_country: self.var_value("vendorcountry"),
            software_info: self.var_value("rescue_phoneinfo"),
            rescue_version: self.var_value("rescue_version"),
            update_state: self.var_value("system_update_state"),
            ..Default::default()
        };

        if let Ok(raw) = self.client.oem("get-psid") {
            let psid = parse_psid(&raw);
            info.imei1 = psid.imei1;
            info.imei2 = psid.imei2;
            info.meid = psid.meid;
        }

        let (is_honor, is_huawei) = detect_brand(
            &info.product_model,
            &info.device_model,
            &info.software_info,
        );
        info.is_honor = is_honor;
        info.is_huawei = is_huawei;
        info.is_unlocked = info.bl_lock_status.to_uppercase().contains("UNLOCK");

        Ok(info)
    }
}
