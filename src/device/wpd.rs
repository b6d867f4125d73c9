//! Windows Portable Devices provider
//!
//! Implements [`DeviceProvider`], [`ContentSession`] and [`ChildCursor`] over
//! the WPD COM interfaces. COM must be initialised on the calling thread (see
//! [`ComGuard`]) before a [`WpdProvider`] is created.

use crate::core::error::{EnumError, Result};
use crate::device::traits::{
    AccessConfig, ChildCursor, ContentSession, DeviceBinding, DeviceProvider, ObjectId,
    ObjectProperties, Page, PropertyKey, PropertyValue,
};
use log::{debug, trace};
use std::ptr::null_mut;
use windows::{
    core::{GUID, PCWSTR, PWSTR},
    Win32::{
        Devices::PortableDevices::{
            IEnumPortableDeviceObjectIDs, IPortableDevice, IPortableDeviceContent,
            IPortableDeviceKeyCollection, IPortableDeviceManager, IPortableDeviceProperties,
            IPortableDeviceValues, PortableDevice, PortableDeviceFTM, PortableDeviceKeyCollection,
            PortableDeviceManager, PortableDeviceValues, WPD_CLIENT_DESIRED_ACCESS,
            WPD_CLIENT_MAJOR_VERSION, WPD_CLIENT_MINOR_VERSION, WPD_CLIENT_NAME,
            WPD_CLIENT_REVISION, WPD_CLIENT_SECURITY_QUALITY_OF_SERVICE, WPD_CLIENT_SHARE_MODE,
            WPD_OBJECT_CONTENT_TYPE, WPD_OBJECT_NAME, WPD_OBJECT_ORIGINAL_FILE_NAME,
            WPD_OBJECT_SIZE,
        },
        Foundation::S_OK,
        System::Com::{
            CoCreateInstance, CoInitializeEx, CoTaskMemFree, CoUninitialize, CLSCTX_INPROC_SERVER,
            COINIT, COINIT_DISABLE_OLE1DDE, COINIT_MULTITHREADED,
        },
        UI::Shell::PropertiesSystem::PROPERTYKEY,
    },
};

/// `E_ACCESSDENIED`
const E_ACCESS_DENIED: u32 = 0x8007_0005;

/// Null-terminated UTF-16 copy of `s`
fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Take ownership of a string allocated by the device service
///
/// # Safety
/// `ptr` must be null or a string allocated with `CoTaskMemAlloc`.
unsafe fn take_co_string(ptr: PWSTR) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let value = ptr.to_string().unwrap_or_default();
    CoTaskMemFree(Some(ptr.0 as *const _));
    value
}

fn property_key(key: &PROPERTYKEY) -> PropertyKey {
    PropertyKey::new(key.fmtid.to_u128(), key.pid)
}

/// Device manager backed by `IPortableDeviceManager`
pub struct WpdProvider {
    manager: IPortableDeviceManager,
    binding: DeviceBinding,
}

impl WpdProvider {
    /// Create the device manager (COM must already be initialized)
    pub fn new(binding: DeviceBinding) -> Result<Self> {
        let manager: IPortableDeviceManager =
            unsafe { CoCreateInstance(&PortableDeviceManager, None, CLSCTX_INPROC_SERVER) }
                .map_err(|e| {
                    EnumError::ComError(format!("Failed to create device manager: {}", e))
                })?;

        Ok(Self { manager, binding })
    }

    pub fn binding(&self) -> DeviceBinding {
        self.binding
    }

    /// Read one display string with the size-then-fill protocol
    fn device_string<F>(&self, device_id: &str, operation: &'static str, call: F) -> Result<String>
    where
        F: Fn(PCWSTR, PWSTR, &mut u32) -> windows::core::Result<()>,
    {
        let device_id_wide = wide(device_id);
        let id = PCWSTR(device_id_wide.as_ptr());

        let mut length: u32 = 0;
        let _ = call(id, PWSTR::null(), &mut length);
        if length == 0 {
            return Err(EnumError::provider(operation, "property not found"));
        }

        let mut buffer: Vec<u16> = vec![0; length as usize];
        call(id, PWSTR(buffer.as_mut_ptr()), &mut length)
            .map_err(|e| EnumError::provider(operation, e))?;

        let end = (length as usize).saturating_sub(1).min(buffer.len());
        Ok(String::from_utf16_lossy(&buffer[..end]))
    }

    fn client_values(access: &AccessConfig) -> Result<IPortableDeviceValues> {
        unsafe {
            let values: IPortableDeviceValues =
                CoCreateInstance(&PortableDeviceValues, None, CLSCTX_INPROC_SERVER).map_err(
                    |e| EnumError::ComError(format!("Failed to create client info: {}", e)),
                )?;

            let client_name = wide(&access.client.name);
            values.SetStringValue(&WPD_CLIENT_NAME, PCWSTR(client_name.as_ptr()))?;
            values.SetUnsignedIntegerValue(&WPD_CLIENT_MAJOR_VERSION, access.client.major_version)?;
            values.SetUnsignedIntegerValue(&WPD_CLIENT_MINOR_VERSION, access.client.minor_version)?;
            values.SetUnsignedIntegerValue(&WPD_CLIENT_REVISION, access.client.revision)?;
            values.SetUnsignedIntegerValue(
                &WPD_CLIENT_SECURITY_QUALITY_OF_SERVICE,
                access.security_qos,
            )?;
            values.SetUnsignedIntegerValue(&WPD_CLIENT_DESIRED_ACCESS, access.desired_access)?;
            values.SetUnsignedIntegerValue(&WPD_CLIENT_SHARE_MODE, access.share_mode)?;

            Ok(values)
        }
    }
}

impl DeviceProvider for WpdProvider {
    type Session = WpdSession;

    fn device_ids(&self) -> Result<Vec<String>> {
        unsafe {
            let mut count: u32 = 0;
            self.manager
                .GetDevices(null_mut(), &mut count)
                .map_err(|e| EnumError::provider("GetDevices", e))?;

            if count == 0 {
                return Ok(Vec::new());
            }

            let mut ids: Vec<PWSTR> = vec![PWSTR::null(); count as usize];
            self.manager
                .GetDevices(ids.as_mut_ptr(), &mut count)
                .map_err(|e| EnumError::provider("GetDevices", e))?;

            Ok(ids
                .into_iter()
                .take(count as usize)
                .map(|ptr| take_co_string(ptr))
                .collect())
        }
    }

    fn device_count(&self) -> Result<usize> {
        let mut count: u32 = 0;
        unsafe { self.manager.GetDevices(null_mut(), &mut count) }
            .map_err(|e| EnumError::provider("GetDevices", e))?;
        Ok(count as usize)
    }

    fn refresh(&self) -> Result<()> {
        unsafe { self.manager.RefreshDeviceList() }
            .map_err(|e| EnumError::provider("RefreshDeviceList", e))
    }

    fn friendly_name(&self, device_id: &str) -> Result<String> {
        self.device_string(device_id, "GetDeviceFriendlyName", |id, buf, len| unsafe {
            self.manager.GetDeviceFriendlyName(id, buf, len)
        })
    }

    fn manufacturer(&self, device_id: &str) -> Result<String> {
        self.device_string(device_id, "GetDeviceManufacturer", |id, buf, len| unsafe {
            self.manager.GetDeviceManufacturer(id, buf, len)
        })
    }

    fn description(&self, device_id: &str) -> Result<String> {
        self.device_string(device_id, "GetDeviceDescription", |id, buf, len| unsafe {
            self.manager.GetDeviceDescription(id, buf, len)
        })
    }

    fn open(&self, device_id: &str, access: &AccessConfig) -> Result<WpdSession> {
        let class: &GUID = match self.binding {
            DeviceBinding::Standard => &PortableDevice,
            DeviceBinding::FreeThreaded => &PortableDeviceFTM,
        };

        unsafe {
            let device: IPortableDevice = CoCreateInstance(class, None, CLSCTX_INPROC_SERVER)
                .map_err(|e| {
                    EnumError::ComError(format!("Failed to create device object: {}", e))
                })?;

            let client_info = Self::client_values(access)?;
            let device_id_wide = wide(device_id);
            device
                .Open(PCWSTR(device_id_wide.as_ptr()), &client_info)
                .map_err(|e| {
                    if e.code().0 as u32 == E_ACCESS_DENIED {
                        EnumError::AccessDenied
                    } else {
                        EnumError::provider("Open", e)
                    }
                })?;

            // From here on the session owns the open device and closes it on drop
            let mut session = WpdSession {
                device,
                content: None,
                properties: None,
                keys: None,
                closed: false,
            };

            let content = session
                .device
                .Content()
                .map_err(|e| EnumError::provider("Content", e))?;
            let properties = content
                .Properties()
                .map_err(|e| EnumError::provider("Properties", e))?;

            let keys: IPortableDeviceKeyCollection =
                CoCreateInstance(&PortableDeviceKeyCollection, None, CLSCTX_INPROC_SERVER)
                    .map_err(|e| {
                        EnumError::ComError(format!("Failed to create key collection: {}", e))
                    })?;
            keys.Add(&WPD_OBJECT_NAME)?;
            keys.Add(&WPD_OBJECT_ORIGINAL_FILE_NAME)?;
            keys.Add(&WPD_OBJECT_CONTENT_TYPE)?;
            keys.Add(&WPD_OBJECT_SIZE)?;

            session.content = Some(content);
            session.properties = Some(properties);
            session.keys = Some(keys);

            debug!("Opened device {} ({:?} binding)", device_id, self.binding);
            Ok(session)
        }
    }
}

/// An open `IPortableDevice`
pub struct WpdSession {
    device: IPortableDevice,
    content: Option<IPortableDeviceContent>,
    properties: Option<IPortableDeviceProperties>,
    keys: Option<IPortableDeviceKeyCollection>,
    closed: bool,
}

impl WpdSession {
    fn content(&self) -> Result<&IPortableDeviceContent> {
        self.content
            .as_ref()
            .ok_or_else(|| EnumError::provider("Content", "session is closed"))
    }
}

impl ContentSession for WpdSession {
    type Cursor = WpdCursor;

    fn list_children(&self, parent: &ObjectId) -> Result<WpdCursor> {
        let parent_wide = wide(parent.as_str());
        let enumerator = unsafe {
            self.content()?
                .EnumObjects(0, PCWSTR(parent_wide.as_ptr()), None)
        }
        .map_err(|e| EnumError::provider("EnumObjects", e))?;

        Ok(WpdCursor {
            enumerator: Some(enumerator),
        })
    }

    fn properties(&self, object: &ObjectId) -> Result<ObjectProperties> {
        let (properties, keys) = match (&self.properties, &self.keys) {
            (Some(p), Some(k)) => (p, k),
            _ => return Err(EnumError::provider("GetValues", "session is closed")),
        };

        let object_wide = wide(object.as_str());
        // Every value the driver has when keys are traced, the decoded set otherwise
        let all_keys = log::log_enabled!(log::Level::Trace);
        let values = unsafe {
            if all_keys {
                properties.GetValues(PCWSTR(object_wide.as_ptr()), None)
            } else {
                properties.GetValues(PCWSTR(object_wide.as_ptr()), keys)
            }
        }
        .map_err(|e| EnumError::provider("GetValues", e))?;

        let mut props = ObjectProperties::new();
        unsafe {
            for key in [&WPD_OBJECT_NAME, &WPD_OBJECT_ORIGINAL_FILE_NAME] {
                if let Ok(ptr) = values.GetStringValue(key) {
                    props.insert(property_key(key), PropertyValue::Text(take_co_string(ptr)));
                }
            }
            if let Ok(guid) = values.GetGuidValue(&WPD_OBJECT_CONTENT_TYPE) {
                props.insert(
                    property_key(&WPD_OBJECT_CONTENT_TYPE),
                    PropertyValue::Guid(guid.to_u128()),
                );
            }
            if let Ok(size) = values.GetUnsignedLargeIntegerValue(&WPD_OBJECT_SIZE) {
                props.insert(
                    property_key(&WPD_OBJECT_SIZE),
                    PropertyValue::UnsignedInteger(size),
                );
            }

            if all_keys {
                let mut count = 0u32;
                values
                    .GetCount(&mut count)
                    .map_err(|e| EnumError::provider("GetCount", e))?;
                for index in 0..count {
                    let mut key = PROPERTYKEY::default();
                    if values.GetAt(index, &mut key, null_mut()).is_ok() {
                        props.insert_if_absent(property_key(&key), PropertyValue::Other);
                    }
                }
            }
        }

        Ok(props)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.keys = None;
        self.properties = None;
        self.content = None;
        unsafe { self.device.Close() }.map_err(|e| EnumError::provider("Close", e))
    }
}

impl Drop for WpdSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// One `IEnumPortableDeviceObjectIDs`
pub struct WpdCursor {
    enumerator: Option<IEnumPortableDeviceObjectIDs>,
}

impl ChildCursor for WpdCursor {
    fn next_page(&mut self, max: u32) -> Result<Page> {
        let enumerator = self
            .enumerator
            .as_ref()
            .ok_or_else(|| EnumError::provider("Next", "cursor is closed"))?;

        let mut ids: Vec<PWSTR> = vec![PWSTR::null(); max as usize];
        let mut fetched: u32 = 0;
        let hr = unsafe { enumerator.Next(&mut ids, &mut fetched as *mut u32) };
        hr.ok().map_err(|e| EnumError::provider("Next", e))?;

        // Null ids become empty ones so the page length still matches `fetched`
        let page_ids: Vec<ObjectId> = ids
            .into_iter()
            .take(fetched as usize)
            .map(|ptr| ObjectId::new(unsafe { take_co_string(ptr) }))
            .collect();

        // S_FALSE: fewer than requested, nothing left
        let is_exhausted = hr != S_OK;
        trace!("Next returned {} id(s), exhausted: {}", fetched, is_exhausted);

        Ok(Page {
            ids: page_ids,
            is_exhausted,
        })
    }

    fn close(&mut self) {
        self.enumerator = None;
    }
}

/// RAII guard for COM initialization
pub struct ComGuard {
    initialized: bool,
}

impl ComGuard {
    /// Initialize COM for this thread (multithreaded apartment, no OLE1 DDE)
    pub fn new() -> Result<Self> {
        let flags = COINIT(COINIT_MULTITHREADED.0 | COINIT_DISABLE_OLE1DDE.0);
        unsafe { CoInitializeEx(None, flags) }
            .ok()
            .map_err(|e| EnumError::ComError(format!("Failed to initialize COM: {}", e)))?;

        Ok(Self { initialized: true })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

/// Initialize COM and return a guard that will uninitialize on drop
pub fn initialize_com() -> Result<ComGuard> {
    ComGuard::new()
}
