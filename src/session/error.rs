use thiserror::Error;

use super::View;

/// Controller-level failures. The display text is what the ATM shows the player.
#[derive(Debug, Error)]
pub enum AtmError {
    #[error("No hay ninguna sesión de cajero abierta")]
    NoSession,
    #[error("El PIN debe tener 4 dígitos")]
    InvalidPinFormat,
    #[error("No hay tarjeta seleccionada")]
    NoCardSelected,
    #[error("Esta tarjeta está bloqueada")]
    CardBlocked,
    #[error("Verificación de PIN en curso")]
    VerificationInFlight,
    #[error("Error al verificar PIN")]
    Verification,
    #[error("{0}")]
    Authority(String),
    #[error("Introduce una cantidad válida")]
    InvalidAmount,
    #[error("Cuenta destino inválida")]
    InvalidTargetAccount,
    #[error("No hay cuenta seleccionada")]
    NoAccountSelected,
    #[error("Acción no disponible en la vista {actual:?} (requiere {expected})")]
    WrongView { expected: &'static str, actual: View },
    #[error("Tarjeta desconocida: {0}")]
    UnknownCard(i64),
    #[error("Cuenta desconocida: {0}")]
    UnknownAccount(i64),
    #[error("Error de comunicación con el servidor: {source}")]
    Host { source: anyhow::Error },
}
