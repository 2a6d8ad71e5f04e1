#[cfg(target_os = "windows")]
mod imp {
    #![allow(non_snake_case)]

    use std::ffi::c_void;
    use std::os::windows::ffi::OsStrExt;
    use std::path::{Path, PathBuf};

    use windows_sys::core::{GUID, HRESULT};
    use windows_sys::Win32::Foundation::{GetLastError, ERROR_SUCCESS, HWND, MAX_PATH};
    use windows_sys::Win32::Graphics::Gdi::{
        DeleteObject, GetDC, GetDIBits, GetObjectW, ReleaseDC, BITMAP, BITMAPINFO,
        BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HBITMAP, HDC,
    };
    use windows_sys::Win32::Storage::FileSystem::{FILE_ATTRIBUTE_DIRECTORY, FILE_ATTRIBUTE_NORMAL};
    use windows_sys::Win32::System::Com::{CoCreateInstance, CLSCTX_INPROC_SERVER, STGM_READ};
    use windows_sys::Win32::System::Registry::{
        RegGetValueW, HKEY, HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, RRF_RT_REG_SZ,
    };
    use windows_sys::Win32::UI::Controls::{ImageList_GetIcon, ILD_TRANSPARENT};
    use windows_sys::Win32::UI::Shell::{
        ExtractAssociatedIconW, ExtractIconExW, FindExecutableW, SHGetFileInfoW, SHFILEINFOW,
        SHGFI_ICON, SHGFI_LARGEICON, SHGFI_LINKOVERLAY, SHGFI_OPENICON, SHGFI_SMALLICON,
        SHGFI_SYSICONINDEX,
    };
    use windows_sys::Win32::UI::WindowsAndMessaging::{DestroyIcon, GetIconInfo, HICON, ICONINFO};

    use crate::error::{IconError, IconErrorKind};
    use crate::model::{FolderType, Icon, IconSize};
    use crate::shell::{executable_from_command, is_network_root, LinkTarget, ShellProvider};

    const CLSID_SHELL_LINK: GUID = GUID {
        data1: 0x0002_1401,
        data2: 0x0000,
        data3: 0x0000,
        data4: [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
    };
    const IID_ISHELL_LINK_W: GUID = GUID {
        data1: 0x0002_14F9,
        data2: 0x0000,
        data3: 0x0000,
        data4: [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
    };
    const IID_IPERSIST_FILE: GUID = GUID {
        data1: 0x0000_010B,
        data2: 0x0000,
        data3: 0x0000,
        data4: [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
    };

    const SE_ERR_NOASSOC: usize = 31;
    const LINK_TEXT_CAPACITY: usize = 1024;

    const USER_CHOICE_KEY: &str =
        r"Software\Microsoft\Windows\Shell\Associations\UrlAssociations\http\UserChoice";
    const HTTP_OPEN_COMMAND_KEY: &str = r"http\shell\open\command";

    type Unused = usize;

    #[repr(C)]
    struct IShellLinkWVtbl {
        QueryInterface: unsafe extern "system" fn(*mut c_void, *const GUID, *mut *mut c_void) -> HRESULT,
        AddRef: unsafe extern "system" fn(*mut c_void) -> u32,
        Release: unsafe extern "system" fn(*mut c_void) -> u32,
        GetPath: unsafe extern "system" fn(*mut c_void, *mut u16, i32, *mut c_void, u32) -> HRESULT,
        GetIDList: Unused,
        SetIDList: Unused,
        GetDescription: Unused,
        SetDescription: Unused,
        GetWorkingDirectory: unsafe extern "system" fn(*mut c_void, *mut u16, i32) -> HRESULT,
        SetWorkingDirectory: Unused,
        GetArguments: unsafe extern "system" fn(*mut c_void, *mut u16, i32) -> HRESULT,
        SetArguments: Unused,
        GetHotkey: Unused,
        SetHotkey: Unused,
        GetShowCmd: Unused,
        SetShowCmd: Unused,
        GetIconLocation: unsafe extern "system" fn(*mut c_void, *mut u16, i32, *mut i32) -> HRESULT,
    }

    #[repr(C)]
    struct IPersistFileVtbl {
        QueryInterface: unsafe extern "system" fn(*mut c_void, *const GUID, *mut *mut c_void) -> HRESULT,
        AddRef: unsafe extern "system" fn(*mut c_void) -> u32,
        Release: unsafe extern "system" fn(*mut c_void) -> u32,
        GetClassID: Unused,
        IsDirty: Unused,
        Load: unsafe extern "system" fn(*mut c_void, *const u16, u32) -> HRESULT,
    }

    /// Owns one COM reference and releases it on drop.
    struct ComRef<V> {
        ptr: *mut c_void,
        _vtbl: std::marker::PhantomData<V>,
    }

    impl<V> ComRef<V> {
        fn vtbl(&self) -> &V {
            unsafe { &**(self.ptr as *mut *const V) }
        }
    }

    impl<V> Drop for ComRef<V> {
        fn drop(&mut self) {
            // IUnknown::Release is the third slot of every vtable.
            unsafe {
                let vtbl = *(self.ptr as *mut *const [usize; 3]);
                let release: unsafe extern "system" fn(*mut c_void) -> u32 =
                    std::mem::transmute((*vtbl)[2]);
                release(self.ptr);
            }
        }
    }

    /// Owns an `HICON` returned by the shell.
    struct OwnedIcon(HICON);

    impl Drop for OwnedIcon {
        fn drop(&mut self) {
            if !self.0.is_null() {
                unsafe {
                    DestroyIcon(self.0);
                }
            }
        }
    }

    struct ScreenDc(HDC);

    impl ScreenDc {
        fn get() -> Option<Self> {
            let hdc = unsafe { GetDC(std::ptr::null_mut() as HWND) };
            (!hdc.is_null()).then_some(Self(hdc))
        }
    }

    impl Drop for ScreenDc {
        fn drop(&mut self) {
            unsafe {
                ReleaseDC(std::ptr::null_mut() as HWND, self.0);
            }
        }
    }

    /// The Windows shell, via `SHGetFileInfoW`, `IShellLinkW` and friends.
    #[derive(Debug, Default)]
    pub struct WindowsShell;

    impl ShellProvider for WindowsShell {
        fn lookup_file_icon(
            &self,
            path: &Path,
            link_overlay: bool,
            size: IconSize,
        ) -> Result<Option<Icon>, IconError> {
            let mut sfi: SHFILEINFOW = unsafe { std::mem::zeroed() };
            let wide = to_wide_path(path);
            let mut flags = SHGFI_ICON | SHGFI_SYSICONINDEX | size_flag(size);
            if link_overlay {
                flags |= SHGFI_LINKOVERLAY;
            }

            let image_list = unsafe {
                SHGetFileInfoW(
                    wide.as_ptr(),
                    FILE_ATTRIBUTE_NORMAL,
                    &mut sfi,
                    std::mem::size_of::<SHFILEINFOW>() as u32,
                    flags,
                )
            };
            let shell_icon = OwnedIcon(sfi.hIcon);
            if image_list == 0 {
                return Ok(None);
            }

            if link_overlay {
                return icon_from_handle(path, shell_icon.0);
            }

            // The image list copy comes without the shortcut arrow.
            let plain = OwnedIcon(unsafe {
                ImageList_GetIcon(image_list as _, sfi.iIcon, ILD_TRANSPARENT)
            });
            icon_from_handle(path, plain.0)
        }

        fn lookup_folder_icon(
            &self,
            path: &Path,
            folder: FolderType,
            link_overlay: bool,
            size: IconSize,
        ) -> Result<Option<Icon>, IconError> {
            let mut sfi: SHFILEINFOW = unsafe { std::mem::zeroed() };
            let wide = to_wide_path(path);
            let mut flags = SHGFI_ICON | size_flag(size);
            if link_overlay {
                flags |= SHGFI_LINKOVERLAY;
            }
            if folder == FolderType::Open {
                flags |= SHGFI_OPENICON;
            }

            let result = unsafe {
                SHGetFileInfoW(
                    wide.as_ptr(),
                    FILE_ATTRIBUTE_DIRECTORY,
                    &mut sfi,
                    std::mem::size_of::<SHFILEINFOW>() as u32,
                    flags,
                )
            };
            let shell_icon = OwnedIcon(sfi.hIcon);
            if result == 0 {
                return Ok(None);
            }
            icon_from_handle(path, shell_icon.0)
        }

        fn resolve_link(&self, path: &Path) -> Result<LinkTarget, IconError> {
            let link = create_shell_link(path)?;
            let persist = query_persist_file(&link, path)?;

            let wide = to_wide_path(path);
            let hr = unsafe { (persist.vtbl().Load)(persist.ptr, wide.as_ptr(), STGM_READ) };
            check_hresult(path, hr)?;

            let mut target = vec![0_u16; MAX_PATH as usize];
            let hr = unsafe {
                (link.vtbl().GetPath)(
                    link.ptr,
                    target.as_mut_ptr(),
                    target.len() as i32,
                    std::ptr::null_mut(),
                    0,
                )
            };
            check_hresult(path, hr)?;

            let mut arguments = vec![0_u16; LINK_TEXT_CAPACITY];
            let hr = unsafe {
                (link.vtbl().GetArguments)(link.ptr, arguments.as_mut_ptr(), arguments.len() as i32)
            };
            check_hresult(path, hr)?;

            let mut working_dir = vec![0_u16; MAX_PATH as usize];
            let hr = unsafe {
                (link.vtbl().GetWorkingDirectory)(
                    link.ptr,
                    working_dir.as_mut_ptr(),
                    working_dir.len() as i32,
                )
            };
            check_hresult(path, hr)?;

            let mut icon_location = vec![0_u16; MAX_PATH as usize];
            let mut icon_index = 0_i32;
            let hr = unsafe {
                (link.vtbl().GetIconLocation)(
                    link.ptr,
                    icon_location.as_mut_ptr(),
                    icon_location.len() as i32,
                    &mut icon_index,
                )
            };
            check_hresult(path, hr)?;

            let target_path = PathBuf::from(from_wide(&target));
            let icon_file = from_wide(&icon_location);
            let icon_location = if icon_file.is_empty() {
                String::new()
            } else {
                format!("{icon_file},{icon_index}")
            };

            Ok(LinkTarget {
                is_directory: target_path.is_dir(),
                is_network_root: is_network_root(&target_path),
                target_path,
                arguments: from_wide(&arguments),
                working_directory: from_wide(&working_dir),
                icon_location,
            })
        }

        fn extract_associated_icon(&self, path: &Path) -> Result<Option<Icon>, IconError> {
            let mut buffer = to_wide_path(path);
            if buffer.len() > MAX_PATH as usize {
                return Err(IconError::new(
                    IconErrorKind::PathTooLong,
                    path,
                    "associated icon lookup is limited to MAX_PATH",
                ));
            }
            buffer.resize(MAX_PATH as usize, 0);

            let mut index = 0_u16;
            let handle = OwnedIcon(unsafe {
                ExtractAssociatedIconW(std::ptr::null_mut(), buffer.as_mut_ptr(), &mut index)
            });
            if handle.0.is_null() {
                return Err(last_error(path));
            }
            icon_from_handle(path, handle.0)
        }

        fn default_browser_path(&self) -> Result<Option<PathBuf>, IconError> {
            let command = read_reg_string(HKEY_CURRENT_USER, USER_CHOICE_KEY, Some("ProgId"))
                .and_then(|prog_id| {
                    read_reg_string(
                        HKEY_CLASSES_ROOT,
                        &format!(r"{prog_id}\shell\open\command"),
                        None,
                    )
                })
                .or_else(|| read_reg_string(HKEY_CLASSES_ROOT, HTTP_OPEN_COMMAND_KEY, None));

            Ok(command.as_deref().and_then(executable_from_command))
        }

        fn find_executable(&self, path: &Path) -> Result<Option<PathBuf>, IconError> {
            let file = to_wide_path(path);
            let directory = [0_u16];
            let mut result = vec![0_u16; MAX_PATH as usize];
            let code = unsafe {
                FindExecutableW(file.as_ptr(), directory.as_ptr(), result.as_mut_ptr())
            } as usize;

            if code == SE_ERR_NOASSOC {
                return Ok(None);
            }
            if code <= 32 {
                return Err(IconError::from_os_code(path, code as u32));
            }

            let exe = from_wide(&result);
            Ok((!exe.is_empty()).then(|| PathBuf::from(exe)))
        }

        fn extract_all_icons(&self, executable: &Path) -> Result<Vec<Icon>, IconError> {
            let file = to_wide_path(executable);
            let count = unsafe {
                ExtractIconExW(
                    file.as_ptr(),
                    -1,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    0,
                )
            };
            if count == 0 || count == u32::MAX {
                return Ok(Vec::new());
            }

            let mut handles: Vec<HICON> = vec![std::ptr::null_mut(); count as usize];
            let extracted = unsafe {
                ExtractIconExW(
                    file.as_ptr(),
                    0,
                    handles.as_mut_ptr(),
                    std::ptr::null_mut(),
                    count,
                )
            };
            let owned: Vec<OwnedIcon> = handles
                .into_iter()
                .take(extracted as usize)
                .map(OwnedIcon)
                .collect();

            let mut icons = Vec::with_capacity(owned.len());
            for handle in &owned {
                if let Some(icon) = icon_from_handle(executable, handle.0)? {
                    icons.push(icon);
                }
            }
            Ok(icons)
        }
    }

    fn size_flag(size: IconSize) -> u32 {
        match size {
            IconSize::Small => SHGFI_SMALLICON,
            IconSize::Large => SHGFI_LARGEICON,
        }
    }

    fn create_shell_link(path: &Path) -> Result<ComRef<IShellLinkWVtbl>, IconError> {
        let mut ptr: *mut c_void = std::ptr::null_mut();
        let hr = unsafe {
            CoCreateInstance(
                &CLSID_SHELL_LINK,
                std::ptr::null_mut(),
                CLSCTX_INPROC_SERVER,
                &IID_ISHELL_LINK_W,
                &mut ptr,
            )
        };
        check_hresult(path, hr)?;
        if ptr.is_null() {
            return Err(IconError::unexpected(path, "CoCreateInstance returned no link"));
        }
        Ok(ComRef {
            ptr,
            _vtbl: std::marker::PhantomData,
        })
    }

    fn query_persist_file(
        link: &ComRef<IShellLinkWVtbl>,
        path: &Path,
    ) -> Result<ComRef<IPersistFileVtbl>, IconError> {
        let mut ptr: *mut c_void = std::ptr::null_mut();
        let hr = unsafe { (link.vtbl().QueryInterface)(link.ptr, &IID_IPERSIST_FILE, &mut ptr) };
        check_hresult(path, hr)?;
        if ptr.is_null() {
            return Err(IconError::unexpected(path, "link has no IPersistFile"));
        }
        Ok(ComRef {
            ptr,
            _vtbl: std::marker::PhantomData,
        })
    }

    fn check_hresult(path: &Path, hr: HRESULT) -> Result<(), IconError> {
        if hr < 0 {
            Err(IconError::from_hresult(path, hr))
        } else {
            Ok(())
        }
    }

    fn last_error(path: &Path) -> IconError {
        let code = unsafe { GetLastError() };
        IconError::from_os_code(path, code)
    }

    /// Copies an `HICON` into straight-alpha pixels. The handle stays owned
    /// by the caller.
    fn icon_from_handle(path: &Path, hicon: HICON) -> Result<Option<Icon>, IconError> {
        if hicon.is_null() {
            return Ok(None);
        }

        let mut info: ICONINFO = unsafe { std::mem::zeroed() };
        if unsafe { GetIconInfo(hicon, &mut info) } == 0 {
            return Err(last_error(path));
        }
        let color = OwnedBitmap(info.hbmColor);
        let mask = OwnedBitmap(info.hbmMask);
        if color.0.is_null() {
            return Err(IconError::new(
                IconErrorKind::NotSupported,
                path,
                "monochrome icons are not supported",
            ));
        }

        let mut bitmap: BITMAP = unsafe { std::mem::zeroed() };
        let read = unsafe {
            GetObjectW(
                color.0 as _,
                std::mem::size_of::<BITMAP>() as i32,
                &mut bitmap as *mut BITMAP as *mut c_void,
            )
        };
        if read == 0 || bitmap.bmWidth <= 0 || bitmap.bmHeight <= 0 {
            return Err(IconError::unexpected(path, "icon bitmap has no size"));
        }
        let width = bitmap.bmWidth as u32;
        let height = bitmap.bmHeight as u32;

        let dc = ScreenDc::get().ok_or_else(|| IconError::unexpected(path, "GetDC failed"))?;
        let mut pixels = read_bitmap_bits(&dc, color.0, width, height)
            .ok_or_else(|| IconError::unexpected(path, "GetDIBits failed on icon colour"))?;

        if pixels.iter().all(|px| px >> 24 == 0) {
            let mask_bits = if mask.0.is_null() {
                None
            } else {
                read_bitmap_bits(&dc, mask.0, width, height)
            };
            for (i, px) in pixels.iter_mut().enumerate() {
                let transparent = mask_bits
                    .as_ref()
                    .is_some_and(|bits| bits[i] & 0x00FF_FFFF != 0);
                *px = if transparent { 0 } else { *px | 0xFF00_0000 };
            }
        }

        Ok(Icon::new(width, height, pixels))
    }

    struct OwnedBitmap(HBITMAP);

    impl Drop for OwnedBitmap {
        fn drop(&mut self) {
            if !self.0.is_null() {
                unsafe {
                    DeleteObject(self.0 as _);
                }
            }
        }
    }

    fn read_bitmap_bits(dc: &ScreenDc, bitmap: HBITMAP, width: u32, height: u32) -> Option<Vec<u32>> {
        let mut info: BITMAPINFO = unsafe { std::mem::zeroed() };
        info.bmiHeader = BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width as i32,
            biHeight: -(height as i32),
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB,
            ..unsafe { std::mem::zeroed() }
        };

        let mut pixels = vec![0_u32; (width as usize) * (height as usize)];
        let lines = unsafe {
            GetDIBits(
                dc.0,
                bitmap,
                0,
                height,
                pixels.as_mut_ptr() as *mut c_void,
                &mut info,
                DIB_RGB_COLORS,
            )
        };
        (lines > 0).then_some(pixels)
    }

    fn read_reg_string(root: HKEY, subkey: &str, value: Option<&str>) -> Option<String> {
        let subkey = to_wide(subkey);
        let value = value.map(to_wide);
        let value_ptr = value
            .as_ref()
            .map(|v| v.as_ptr())
            .unwrap_or(std::ptr::null());

        let mut size = 0_u32;
        let status = unsafe {
            RegGetValueW(
                root,
                subkey.as_ptr(),
                value_ptr,
                RRF_RT_REG_SZ,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                &mut size,
            )
        };
        if status != ERROR_SUCCESS || size == 0 {
            return None;
        }

        let mut buffer = vec![0_u16; (size as usize / 2) + 1];
        let mut size = (buffer.len() * 2) as u32;
        let status = unsafe {
            RegGetValueW(
                root,
                subkey.as_ptr(),
                value_ptr,
                RRF_RT_REG_SZ,
                std::ptr::null_mut(),
                buffer.as_mut_ptr() as *mut c_void,
                &mut size,
            )
        };
        if status != ERROR_SUCCESS {
            return None;
        }

        let text = from_wide(&buffer);
        (!text.trim().is_empty()).then_some(text)
    }

    pub fn expand_environment_strings(input: &str) -> String {
        use windows_sys::Win32::System::Environment::ExpandEnvironmentStringsW;

        if !input.contains('%') {
            return input.to_string();
        }

        let source = to_wide(input);
        let needed = unsafe { ExpandEnvironmentStringsW(source.as_ptr(), std::ptr::null_mut(), 0) };
        if needed == 0 {
            return input.to_string();
        }

        let mut expanded = vec![0_u16; needed as usize];
        let written =
            unsafe { ExpandEnvironmentStringsW(source.as_ptr(), expanded.as_mut_ptr(), needed) };
        if written == 0 || written > needed {
            return input.to_string();
        }
        from_wide(&expanded)
    }

    fn to_wide(value: &str) -> Vec<u16> {
        value.encode_utf16().chain(std::iter::once(0)).collect()
    }

    fn to_wide_path(path: &Path) -> Vec<u16> {
        path.as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect()
    }

    fn from_wide(buffer: &[u16]) -> String {
        let len = buffer.iter().position(|c| *c == 0).unwrap_or(buffer.len());
        String::from_utf16_lossy(&buffer[..len])
    }
}

#[cfg(target_os = "windows")]
pub use imp::{expand_environment_strings, WindowsShell};
