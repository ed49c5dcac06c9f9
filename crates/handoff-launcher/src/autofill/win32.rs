use std::mem::size_of;

use windows_sys::Win32::Foundation::{BOOL, HWND, LPARAM, RECT};
use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
    IsWindowEnabled, SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_KEYUP,
    KEYEVENTF_UNICODE, VK_TAB,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    EnumChildWindows, EnumWindows, GetClassNameW, GetWindowLongW, GetWindowRect,
    GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible, SendMessageW,
    SetForegroundWindow, GWL_STYLE, WM_SETTEXT,
};

use super::{AutofillError, FieldInfo, KeyStroke, Rect, UiAutomation, WindowInfo};

const ES_PASSWORD: u32 = 0x0020;

// Handles cross the trait as integers so backend values stay Send + Sync.
fn hwnd(handle: usize) -> HWND {
    handle as HWND
}

unsafe extern "system" fn collect_hwnd(window: HWND, lparam: LPARAM) -> BOOL {
    let out = &mut *(lparam as *mut Vec<usize>);
    out.push(window as usize);
    1
}

fn wide_text(len: usize, read: impl FnOnce(*mut u16, i32) -> i32) -> String {
    let mut buf = vec![0u16; len];
    let copied = read(buf.as_mut_ptr(), buf.len() as i32);
    let copied = usize::try_from(copied).unwrap_or(0).min(buf.len());
    String::from_utf16_lossy(&buf[..copied])
}

fn window_rect(window: HWND) -> Rect {
    let mut rect = RECT {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };
    unsafe {
        GetWindowRect(window, &mut rect);
    }
    Rect::new(rect.left, rect.top, rect.right, rect.bottom)
}

fn key_input(vk: u16, scan: u16, flags: u32) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn inputs_for(keys: &[KeyStroke]) -> Vec<INPUT> {
    let mut inputs = Vec::new();
    for key in keys {
        match key {
            KeyStroke::Text(text) => {
                for unit in text.encode_utf16() {
                    inputs.push(key_input(0, unit, KEYEVENTF_UNICODE));
                    inputs.push(key_input(0, unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP));
                }
            }
            KeyStroke::Tab => {
                inputs.push(key_input(VK_TAB, 0, 0));
                inputs.push(key_input(VK_TAB, 0, KEYEVENTF_KEYUP));
            }
        }
    }
    inputs
}

pub struct Win32Automation;

impl UiAutomation for Win32Automation {
    fn windows_for_process(&self, pid: u32) -> Result<Vec<WindowInfo>, AutofillError> {
        let mut handles: Vec<usize> = Vec::new();
        unsafe {
            EnumWindows(Some(collect_hwnd), &mut handles as *mut Vec<usize> as LPARAM);
        }
        let mut windows = Vec::new();
        for handle in handles {
            let window = hwnd(handle);
            let mut owner = 0u32;
            unsafe {
                GetWindowThreadProcessId(window, &mut owner);
            }
            if owner != pid {
                continue;
            }
            let title = wide_text(512, |buf, len| unsafe { GetWindowTextW(window, buf, len) });
            windows.push(WindowInfo {
                handle,
                pid,
                title,
                rect: window_rect(window),
                visible: unsafe { IsWindowVisible(window) } != 0,
            });
        }
        Ok(windows)
    }

    fn input_fields(&self, window: &WindowInfo) -> Result<Vec<FieldInfo>, AutofillError> {
        let mut handles: Vec<usize> = Vec::new();
        unsafe {
            EnumChildWindows(
                hwnd(window.handle),
                Some(collect_hwnd),
                &mut handles as *mut Vec<usize> as LPARAM,
            );
        }
        Ok(handles
            .into_iter()
            .map(|handle| {
                let child = hwnd(handle);
                let class_name =
                    wide_text(256, |buf, len| unsafe { GetClassNameW(child, buf, len) });
                let style = unsafe { GetWindowLongW(child, GWL_STYLE) } as u32;
                FieldInfo {
                    handle,
                    class_name,
                    rect: window_rect(child),
                    visible: unsafe { IsWindowVisible(child) } != 0,
                    enabled: unsafe { IsWindowEnabled(child) } != 0,
                    is_password: style & ES_PASSWORD != 0,
                }
            })
            .collect())
    }

    fn set_text(&self, field: &FieldInfo, text: &str) -> Result<(), AutofillError> {
        let wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
        let result =
            unsafe { SendMessageW(hwnd(field.handle), WM_SETTEXT, 0, wide.as_ptr() as LPARAM) };
        if result == 0 {
            return Err(AutofillError::Injection(format!(
                "WM_SETTEXT rejected by {} control",
                field.class_name
            )));
        }
        Ok(())
    }

    fn focus(&self, window: &WindowInfo) -> Result<(), AutofillError> {
        if unsafe { SetForegroundWindow(hwnd(window.handle)) } == 0 {
            return Err(AutofillError::Injection(format!(
                "could not bring '{}' to the foreground",
                window.title
            )));
        }
        Ok(())
    }

    fn send_keys(&self, keys: &[KeyStroke]) -> Result<(), AutofillError> {
        let inputs = inputs_for(keys);
        if inputs.is_empty() {
            return Ok(());
        }
        let sent = unsafe {
            SendInput(
                inputs.len() as u32,
                inputs.as_ptr(),
                size_of::<INPUT>() as i32,
            )
        };
        if sent as usize != inputs.len() {
            return Err(AutofillError::Injection(format!(
                "SendInput delivered {sent} of {} events",
                inputs.len()
            )));
        }
        Ok(())
    }
}
