use crate::{enumeration_failure, DeviceClass, Driver, Result, Status};
use log::info;

/// 选中的计算设备。
pub struct SelectedDevice<D: Driver> {
    pub device: D::Device,
    pub class: DeviceClass,
    pub name: String,
}

/// 枚举全部平台上的设备，选出一个计算设备。
///
/// `prefer_cpu` 为真或任何平台上都没有 GPU 时选 CPU，否则选 GPU。
/// 选中第一个拥有该类设备的平台上的第一个设备。
pub fn select_device<D: Driver>(driver: &D, prefer_cpu: bool) -> Result<SelectedDevice<D>> {
    let platforms = driver.platforms().map_err(|s| {
        enumeration_failure("failed to get platform ids").with_status(s)
    })?;
    info!("{} platform IDs found", platforms.len());

    let mut inventory = Vec::with_capacity(platforms.len());
    for (i, platform) in platforms.iter().enumerate() {
        let name = driver.platform_name(platform).map_err(|s| {
            enumeration_failure(format!("failed to query name of platform {}", i + 1)).with_status(s)
        })?;
        info!("=== Platform {}: {name}", i + 1);

        let mut lists = [Vec::new(), Vec::new()];
        for (list, class) in lists.iter_mut().zip([DeviceClass::Gpu, DeviceClass::Cpu]) {
            *list = driver.devices(platform, class).map_err(|s| {
                enumeration_failure(format!("failed to get {class} devices on platform {}", i + 1))
                    .with_status(s)
            })?;
            for (j, device) in list.iter().enumerate() {
                let name = driver.device_name(device).map_err(|s| {
                    enumeration_failure(format!("failed to query name of {class} device {}", j + 1))
                        .with_status(s)
                })?;
                info!("------- {class} device {}: {name}", j + 1);
            }
        }
        inventory.push(lists);
    }

    let gpus = inventory.iter().map(|[gpu, _]| gpu.len()).sum::<usize>();
    let cpus = inventory.iter().map(|[_, cpu]| cpu.len()).sum::<usize>();
    info!("{gpus} GPU and {cpus} CPU devices found");

    let (class, slot) = if prefer_cpu || gpus == 0 {
        (DeviceClass::Cpu, 1)
    } else {
        (DeviceClass::Gpu, 0)
    };
    let Some((platform, device)) = inventory
        .iter()
        .enumerate()
        .find_map(|(i, lists)| lists[slot].first().map(|d| (i, d.clone())))
    else {
        return Err(enumeration_failure(format!("no {class} device found"))
            .with_status(Status::DEVICE_NOT_FOUND));
    };

    let name = driver.device_name(&device).map_err(|s| {
        enumeration_failure("failed to query name of selected device").with_status(s)
    })?;
    info!("using {name} ({class}) on platform {} as compute device", platform + 1);
    Ok(SelectedDevice {
        device,
        class,
        name,
    })
}
