//! Points
//!
//! A point owns an `x` and a `y` variable. Dragging requests new values for
//! both; each coordinate goes through inversion on its own, so a fixed or
//! non-invertible coordinate stays where it is while the other one moves.

use serde::Serialize;
use tracing::debug;

use crate::component::{ComponentId, ComponentKind};
use crate::error::{EngineError, EngineResult, InversionError};
use crate::graph::VarId;
use crate::reactive::Runtime;
use crate::transaction::TransactionReport;
use crate::value::Value;

pub const X: &str = "x";
pub const Y: &str = "y";

/// Current coordinates of a point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointCoords {
    pub x: Value,
    pub y: Value,
}

impl Runtime {
    /// Move a point by `(dx, dy)` as one transaction.
    pub fn drag(&mut self, component: &str, dx: f64, dy: f64) -> EngineResult<TransactionReport> {
        let id = self.component_id(component)?;
        self.transaction("drag", |rt, report| rt.apply_drag(id, dx, dy, report))
    }

    fn apply_drag(
        &mut self,
        id: ComponentId,
        dx: f64,
        dy: f64,
        report: &mut TransactionReport,
    ) -> EngineResult<()> {
        let (x, y) = self.point_vars(id)?;
        self.move_coordinate(x, dx, report)?;
        self.move_coordinate(y, dy, report)
    }

    fn move_coordinate(
        &mut self,
        id: VarId,
        delta: f64,
        report: &mut TransactionReport,
    ) -> EngineResult<()> {
        if delta == 0.0 {
            return Ok(());
        }
        let label = self.var(id).label();
        let Some(current) = self.resolve(id)?.as_number() else {
            debug!(variable = %label, "coordinate has no numeric value, not moved");
            report.rejected.push(label);
            return Ok(());
        };

        match self.plan_update(id, Value::Number(current + delta)) {
            Ok(plan) => self.apply_plan(&plan),
            Err(InversionError::Structural(err)) => Err(err),
            Err(err) => {
                debug!(variable = %label, error = %err, "coordinate not moved");
                report.rejected.push(label);
                Ok(())
            }
        }
    }

    fn point_vars(&self, id: ComponentId) -> EngineResult<(VarId, VarId)> {
        let component = self.component_by_id(id);
        if component.kind() != ComponentKind::Point {
            return Err(EngineError::NotEditable(component.name().to_string()));
        }
        Ok((
            component.require_var(X)?.id(),
            component.require_var(Y)?.id(),
        ))
    }

    pub fn point_coords(&mut self, component: &str) -> EngineResult<PointCoords> {
        let (x, y) = self.point_vars(self.component_id(component)?)?;
        Ok(PointCoords {
            x: self.resolve(x)?,
            y: self.resolve(y)?,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
