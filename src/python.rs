//! Python bindings for the registry editor using PyO3.
//!
//! This module provides a Python-friendly wrapper around [`RegistryEditor`]
//! that can be used as a context manager:
//!
//! ```python
//! from reg_editor import RegistryEditor
//!
//! with RegistryEditor("user.reg") as reg:
//!     reg.set_dword(r"Software\Wine\Direct3D", "csmt", 3)
//!     print(reg.get_string(r"Software\Wine\Direct3D", "renderer", "gl"))
//! ```

use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyBytes;

use crate::{RegistryEditor as RustRegistryEditor, RegistryError};
use crate::{ValueData as RustValueData, ValueType as RustValueType};

/// Convert Rust RegistryError to Python exception
fn registry_error_to_py(err: RegistryError) -> PyErr {
    match err {
        RegistryError::Io(e) => PyIOError::new_err(e.to_string()),

        RegistryError::InvalidFormat(msg) => {
            PyValueError::new_err(format!("Invalid format: {}", msg))
        }

        RegistryError::InvalidDword(text) => {
            PyValueError::new_err(format!("Invalid dword value: {:?}", text))
        }

        RegistryError::InvalidHex(msg) => {
            PyValueError::new_err(format!("Invalid hex value: {}", msg))
        }

        RegistryError::InvalidSplice { position, start } => PyRuntimeError::new_err(format!(
            "Invalid splice: edit at {} starts before position {}",
            start, position
        )),

        RegistryError::SessionClosed => PyRuntimeError::new_err("Editor session is closed"),
    }
}

/// Python wrapper for ValueData
#[pyclass(name = "ValueData")]
#[derive(Clone)]
pub struct PyValueData {
    inner: RustValueData,
}

#[pymethods]
impl PyValueData {
    /// Get the type name (REG_SZ, REG_DWORD, REG_BINARY)
    fn type_name(&self) -> &'static str {
        self.inner.value_type().name()
    }

    /// Check if this is a string value
    fn is_string(&self) -> bool {
        self.inner.value_type() == RustValueType::String
    }

    /// Check if this is a dword value
    fn is_dword(&self) -> bool {
        self.inner.value_type() == RustValueType::Dword
    }

    /// Check if this is a binary value
    fn is_binary(&self) -> bool {
        self.inner.value_type() == RustValueType::Hex
    }

    /// Get as string (raises if not a string)
    fn as_string(&self) -> PyResult<String> {
        self.inner
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PyValueError::new_err("Value is not a string"))
    }

    /// Get as dword (raises if not a dword)
    fn as_dword(&self) -> PyResult<u32> {
        self.inner
            .as_dword()
            .ok_or_else(|| PyValueError::new_err("Value is not a dword"))
    }

    /// Get as bytes (raises if not binary)
    fn as_binary<'py>(&self, py: Python<'py>) -> PyResult<&'py PyBytes> {
        self.inner
            .as_bytes()
            .map(|b| PyBytes::new(py, b))
            .ok_or_else(|| PyValueError::new_err("Value is not binary"))
    }

    fn __repr__(&self) -> String {
        format!("ValueData({}: {})", self.type_name(), self.inner)
    }

    fn __str__(&self) -> String {
        self.inner.to_string()
    }
}

/// Python wrapper for RegistryEditor
///
/// Value names are plain strings; pass `None` for the key's default value.
#[pyclass(name = "RegistryEditor", unsendable)]
pub struct PyRegistryEditor {
    inner: RustRegistryEditor,
}

#[pymethods]
impl PyRegistryEditor {
    /// Open an editing session on a .reg file
    #[new]
    #[pyo3(signature = (path, create_key_if_not_exist = true))]
    fn new(path: &str, create_key_if_not_exist: bool) -> PyResult<Self> {
        let mut inner = RustRegistryEditor::open(path).map_err(registry_error_to_py)?;
        inner.set_create_key_if_not_exist(create_key_if_not_exist);
        Ok(Self { inner })
    }

    fn __enter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    fn __exit__(
        &mut self,
        _exc_type: Option<&PyAny>,
        _exc_value: Option<&PyAny>,
        _traceback: Option<&PyAny>,
    ) -> bool {
        self.inner.close();
        false
    }

    /// Commit (if modified) and end the session
    fn close(&mut self) {
        self.inner.close();
    }

    /// Whether any change has been made
    #[getter]
    fn modified(&self) -> bool {
        self.inner.is_modified()
    }

    /// Whether a section for exactly this key exists
    fn key_exists(&self, key: &str) -> PyResult<bool> {
        self.inner.key_exists(key).map_err(registry_error_to_py)
    }

    /// Get a decoded value, or None
    #[pyo3(signature = (key, name = None))]
    fn get_value(&self, key: &str, name: Option<&str>) -> PyResult<Option<PyValueData>> {
        self.inner
            .get_value(key, name)
            .map(|v| v.map(|inner| PyValueData { inner }))
            .map_err(registry_error_to_py)
    }

    /// Get a string value, or the fallback
    #[pyo3(signature = (key, name = None, fallback = None))]
    fn get_string(&self, key: &str, name: Option<&str>, fallback: Option<String>) -> PyResult<Option<String>> {
        let value = self.inner.get_string_value(key, name).map_err(registry_error_to_py)?;
        Ok(value.or(fallback))
    }

    /// Get a dword value, or the fallback
    #[pyo3(signature = (key, name = None, fallback = None))]
    fn get_dword(&self, key: &str, name: Option<&str>, fallback: Option<u32>) -> PyResult<Option<u32>> {
        let value = self.inner.get_dword_value(key, name).map_err(registry_error_to_py)?;
        Ok(value.or(fallback))
    }

    /// Get a binary value as bytes, or None
    #[pyo3(signature = (key, name = None))]
    fn get_binary<'py>(&self, py: Python<'py>, key: &str, name: Option<&str>) -> PyResult<Option<&'py PyBytes>> {
        let value = self.inner.get_hex_value(key, name).map_err(registry_error_to_py)?;
        Ok(value.map(|b| PyBytes::new(py, &b)))
    }

    /// Set a string value
    fn set_string(&mut self, key: &str, name: Option<&str>, value: &str) -> PyResult<bool> {
        self.inner
            .set_string_value(key, name, value)
            .map_err(registry_error_to_py)
    }

    /// Set several string values of one key in a single rewrite
    fn set_strings(&mut self, key: &str, values: Vec<(Option<String>, String)>) -> PyResult<bool> {
        let pairs: Vec<(Option<&str>, &str)> = values
            .iter()
            .map(|(name, value)| (name.as_deref(), value.as_str()))
            .collect();
        self.inner
            .set_string_values(key, &pairs)
            .map_err(registry_error_to_py)
    }

    /// Set a dword value
    fn set_dword(&mut self, key: &str, name: Option<&str>, value: u32) -> PyResult<bool> {
        self.inner
            .set_dword_value(key, name, value)
            .map_err(registry_error_to_py)
    }

    /// Set a binary value from bytes
    fn set_binary(&mut self, key: &str, name: Option<&str>, value: &[u8]) -> PyResult<bool> {
        self.inner
            .set_hex_value(key, name, value)
            .map_err(registry_error_to_py)
    }

    /// Remove a value; returns False if it did not exist
    #[pyo3(signature = (key, name = None))]
    fn remove_value(&mut self, key: &str, name: Option<&str>) -> PyResult<bool> {
        self.inner.remove_value(key, name).map_err(registry_error_to_py)
    }

    /// Remove a key, optionally with all nested keys
    #[pyo3(signature = (key, subtree = false))]
    fn remove_key(&mut self, key: &str, subtree: bool) -> PyResult<bool> {
        self.inner.remove_key(key, subtree).map_err(registry_error_to_py)
    }

    /// Create a key if it does not exist
    fn create_key(&mut self, key: &str) -> PyResult<()> {
        self.inner
            .create_key(key)
            .map(|_| ())
            .map_err(registry_error_to_py)
    }

    fn __repr__(&self) -> String {
        format!(
            "RegistryEditor(path={:?}, open={}, modified={})",
            self.inner.path().display().to_string(),
            self.inner.is_open(),
            self.inner.is_modified()
        )
    }
}

/// Python module definition
#[pymodule]
fn reg_editor(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyRegistryEditor>()?;
    m.add_class::<PyValueData>()?;

    // Add version constant
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
