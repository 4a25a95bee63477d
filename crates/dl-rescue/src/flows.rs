//! Orchestration of the protocol crates into operator-facing flows.

use std::{
    fs,
    io::{Write, stdout},
    path::Path,
};

use colored::Colorize;
use dl_brom::{BromSession, SlaAuthenticator, commands::SendDaOutcome};
use dl_fastboot::{FastbootClient, VendorAdapter};
use dl_port::{DeviceHandle, config};
use dl_xflash::{Carbonara, ProgressSink, XmlDaClient};

use crate::{Result, err::Error, loader::LoaderSource, log, status};

/// Inline percentage meter for long transfers.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn progress(&self, stage: &str, bytes_done: u64, bytes_total: u64) {
        if bytes_total == 0 {
            return;
        }
        print!("\r{stage}: {}%", bytes_done * 100 / bytes_total);
        if bytes_done == bytes_total {
            println!();
        }
        let _ = stdout().flush();
    }
}

/// Boot DA1, bring the XML session up, then get DA2 running either
/// through BOOT_TO or through the DA1-driven negotiated download.
pub fn boot_da(
    session: &mut BromSession,
    handle: &DeviceHandle,
    source: &dyn LoaderSource,
    negotiated: bool,
    auth: Option<&dyn SlaAuthenticator>,
) -> Result<XmlDaClient> {
    let (da1, da2) = source.lookup(
        *session.hw_code(),
        *session.hw_ver(),
        Some(session.me_id().as_slice()),
    )?;

    let load_addr = *da1.load_addr();
    log!(
        "Uploading {} ({} bytes) to {load_addr:#x}...",
        da1.name(),
        da1.data().len()
    );
    let outcome = status!(session.send_da(load_addr, da1.data(), *da1.signature_len(), auth))?;
    if outcome == SendDaOutcome::Reconnect {
        return Err(Error::ReconnectRequired);
    }

    log!("Jumping to {load_addr:#x}...");
    status!(session.jump_da(load_addr))?;

    let client = XmlDaClient::new(handle.clone());
    log!("Waiting for the DA to come up...");
    status!(client.wait_ready())?;

    if let Some(da2) = da2 {
        if negotiated {
            log!("Streaming {} through the negotiated download...", da2.name());
            status!(client.download_da2(session, da2.data()))?;
        } else {
            let digest = dl_patcher::da2_digest(da2.data(), *da2.signature_len());
            let hash_offset =
                dl_patcher::find_da2_hash_position(da1.data(), *da1.signature_len())?;

            log!("Booting {} through BOOT_TO...", da2.name());
            status!(client.execute_carbonara(
                session,
                &Carbonara {
                    da1_load_addr: load_addr.into(),
                    hash_offset: hash_offset as u64,
                    new_hash: &digest,
                    da2_load_addr: (*da2.load_addr()).into(),
                    patched_da2: da2.data(),
                },
                auth,
            ))?;
        }
    }

    Ok(client)
}

pub fn print_gpt(client: &XmlDaClient) -> Result<()> {
    let table = client.get_partition_table()?;
    println!("{:<32} {:>12} {:>12} {:>14} {}", "name", "start", "sectors", "bytes", "type");
    for part in &table {
        println!(
            "{:<32} {:>12} {:>12} {:>14} {}",
            part.name,
            format!("{:#x}", part.start_sector),
            format!("{:#x}", part.sector_count),
            part.size_bytes,
            part.type_tag,
        );
    }
    Ok(())
}

pub fn read_partition(
    client: &XmlDaClient,
    name: &str,
    size: Option<u64>,
    output: &Path,
) -> Result<()> {
    let size = match size {
        Some(size) => size,
        None => client
            .get_partition_table()?
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.size_bytes)
            .ok_or_else(|| Error::Custom(format!("Partition {name} not found").into()))?,
    };

    let data = client.read_partition(name, size, &ConsoleProgress)?;
    fs::write(output, &data)?;
    println!("Read {} bytes from {name} into {}", data.len(), output.display());
    Ok(())
}

pub fn write_partition(client: &XmlDaClient, name: &str, input: &Path) -> Result<()> {
    let data = fs::read(input)?;
    client.write_partition(name, &data, &ConsoleProgress)?;
    println!("Wrote {} bytes into {name}", data.len());
    Ok(())
}

/// Pull the vendor record from a device sitting in fastboot.
pub fn vendor_info(port_name: &str) -> Result<()> {
    let handle = DeviceHandle::open(port_name, config::META_BAUD)?;
    let client = FastbootClient::new(handle);

    log!("Querying bootloader...");
    let info = status!(VendorAdapter::new(&client).collect())?;

    let brand = if info.is_honor {
        "Honor"
    } else if info.is_huawei {
        "Huawei"
    } else {
        "unknown"
    };

    println!("Brand:            {brand}");
    println!("Product model:    {}", info.product_model);
    println!("Device model:     {}", info.device_model);
    println!("Build number:     {}", info.build_number);
    println!("System version:   {}", info.system_version);
    println!("Base version:     {}", info.base_version);
    println!("Custom version:   {}", info.custom_version);
    println!("Preload version:  {}", info.preload_version);
    println!("IMEI1:            {}", info.imei1);
    println!("IMEI2:            {}", info.imei2);
    println!("MEID:             {}", info.meid);
    println!("Lock state:       {}", info.bl_lock_status);
    println!("Battery:          {}", info.battery_info);
    println!("HW key version:   {}", info.hw_key_version);
    println!("Rescue version:   {}", info.rescue_version);
    println!("Update state:     {}", info.update_state);
    println!("Vendor/country:   {}", info.vendor_country);
    println!(
        "Unlocked:         {}",
        if info.is_unlocked {
            "yes".yellow()
        } else {
            "no".green()
        }
    );

    Ok(())
}
