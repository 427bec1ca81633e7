use chrono::{NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    ItemKind, PivotKind, Reservation, ReservationItem, ReservationStatus, Slot,
};
use crate::repository::{ReservationFilter, Store};
use crate::schemas::{CreateReservationInput, ReservationStatusInput, ReservationsQuery};
use crate::services::activities::load_activity;
use crate::services::unit_of_work::UnitOfWork;

fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn load_slot(store: &dyn Store, agencia_id: Uuid, id: Uuid) -> AppResult<Slot> {
    match store.get_slot(id).await? {
        Some(slot) if slot.agencia_id == agencia_id && slot.deleted_at.is_none() => Ok(slot),
        _ => Err(AppError::NotFound("Slot not found.".to_string())),
    }
}

pub async fn get_reservation(
    store: &dyn Store,
    agencia_id: Uuid,
    id: Uuid,
) -> AppResult<Reservation> {
    match store.get_reservation(id).await? {
        Some(reservation)
            if reservation.agencia_id == agencia_id && reservation.deleted_at.is_none() =>
        {
            Ok(reservation)
        }
        _ => Err(AppError::NotFound("Reservation not found.".to_string())),
    }
}

pub async fn list_reservations(
    store: &dyn Store,
    agencia_id: Uuid,
    query: &ReservationsQuery,
) -> AppResult<Vec<Reservation>> {
    store
        .list_reservations(&ReservationFilter {
            agencia_id: Some(agencia_id),
            actividad_id: query.actividad_id,
            turno_id: query.turno_id,
            estado: query.estado,
            limit: Some(query.limit.clamp(1, 1000)),
            ..ReservationFilter::default()
        })
        .await
}

/// Price the requested line items against the activity's live tariffs and
/// links. Without an explicit tariff item the whole party is charged the
/// principal tariff.
async fn price_items(
    store: &dyn Store,
    actividad_id: Uuid,
    reserva_id: Uuid,
    input: &CreateReservationInput,
) -> AppResult<Vec<ReservationItem>> {
    let tariffs = store.list_tariffs(actividad_id, false).await?;
    let addons = store.list_links(PivotKind::Addons, actividad_id).await?;
    let transports = store.list_links(PivotKind::Transports, actividad_id).await?;

    let mut items = Vec::with_capacity(input.items.len() + 1);
    for (index, requested) in input.items.iter().enumerate() {
        let precio_unitario = match requested.tipo {
            ItemKind::Tarifa => tariffs
                .iter()
                .find(|tariff| tariff.id == requested.ref_id && tariff.is_active())
                .map(|tariff| tariff.precio),
            ItemKind::Adicional => addons
                .iter()
                .find(|link| link.ref_id == requested.ref_id)
                .map(|link| link.precio.unwrap_or(0.0)),
            ItemKind::Transporte => transports
                .iter()
                .find(|link| link.ref_id == requested.ref_id)
                .map(|link| link.precio.unwrap_or(0.0)),
        }
        .ok_or_else(|| {
            AppError::validation_with(
                format!("Item at index {index} is not offered by this activity."),
                json!({ "index": index, "field": "ref_id" }),
            )
        })?;
        items.push(ReservationItem {
            id: Uuid::new_v4(),
            reserva_id,
            tipo: requested.tipo,
            ref_id: requested.ref_id,
            cantidad: requested.cantidad,
            precio_unitario,
        });
    }

    let tariff_seats: i32 = items
        .iter()
        .filter(|item| item.tipo == ItemKind::Tarifa)
        .map(|item| item.cantidad)
        .sum();
    if tariff_seats == 0 {
        let principal = tariffs
            .iter()
            .find(|tariff| tariff.es_principal && tariff.is_active())
            .ok_or_else(|| {
                AppError::UnprocessableEntity("Activity has no active principal tariff.".to_string())
            })?;
        items.insert(
            0,
            ReservationItem {
                id: Uuid::new_v4(),
                reserva_id,
                tipo: ItemKind::Tarifa,
                ref_id: principal.id,
                cantidad: input.cantidad_personas,
                precio_unitario: principal.precio,
            },
        );
    } else if tariff_seats != input.cantidad_personas {
        return Err(AppError::validation_with(
            format!(
                "Tariff items cover {tariff_seats} people but the reservation is for {}.",
                input.cantidad_personas
            ),
            json!({ "field": "items" }),
        ));
    }
    Ok(items)
}

/// Book seats on a slot. The reservation starts as pending and holds its
/// seats until it is cancelled or expires.
pub async fn create_reservation(
    store: &dyn Store,
    agencia_id: Uuid,
    today: NaiveDate,
    input: &CreateReservationInput,
) -> AppResult<Reservation> {
    let slot = load_slot(store, agencia_id, input.turno_id).await?;
    if slot.fecha < today {
        return Err(AppError::UnprocessableEntity(
            "Slot date is in the past.".to_string(),
        ));
    }
    let activity = load_activity(store, agencia_id, slot.actividad_id).await?;
    if input.cantidad_personas < activity.min_personas {
        return Err(AppError::UnprocessableEntity(format!(
            "This activity requires at least {} people.",
            activity.min_personas
        )));
    }
    if slot.cupo_disponible < input.cantidad_personas {
        return Err(AppError::UnprocessableEntity(format!(
            "Only {} seats left for this slot.",
            slot.cupo_disponible
        )));
    }

    let reserva_id = Uuid::new_v4();
    let items = price_items(store, activity.id, reserva_id, input).await?;
    let total = round_money(
        items
            .iter()
            .map(|item| f64::from(item.cantidad) * item.precio_unitario)
            .sum(),
    );
    let now = Utc::now();
    let reservation = Reservation {
        id: reserva_id,
        agencia_id,
        actividad_id: activity.id,
        turno_id: slot.id,
        estado: ReservationStatus::Pending,
        cliente_nombre: input.cliente_nombre.trim().to_string(),
        cliente_email: input.cliente_email.trim().to_lowercase(),
        cliente_telefono: input.cliente_telefono.clone(),
        cantidad_personas: input.cantidad_personas,
        total,
        metodo_pago: input.metodo_pago.clone(),
        pagado: false,
        motivo_cancelacion: None,
        items,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    let mut booked = slot.clone();
    booked.cupo_disponible -= input.cantidad_personas;

    let mut uow = UnitOfWork::begin(store, "create_reservation");
    let result = async {
        let saved = uow.insert_reservation(&reservation).await?;
        uow.save_slot(&slot, &booked).await?;
        Ok::<_, AppError>(saved)
    }
    .await;
    let saved = uow.finish(result).await?;

    tracing::info!(
        reserva_id = %saved.id,
        turno_id = %slot.id,
        personas = saved.cantidad_personas,
        total = saved.total,
        "Reservation created"
    );
    Ok(saved)
}

/// Apply a status transition. Leaving a seat-holding status returns the
/// seats to the slot.
pub async fn update_status(
    store: &dyn Store,
    agencia_id: Uuid,
    id: Uuid,
    input: &ReservationStatusInput,
) -> AppResult<Reservation> {
    let previous = get_reservation(store, agencia_id, id).await?;
    if !previous.estado.can_transition_to(input.estado) {
        return Err(AppError::UnprocessableEntity(format!(
            "Cannot move a reservation from {} to {}.",
            previous.estado.as_str(),
            input.estado.as_str()
        )));
    }

    let now = Utc::now();
    let mut next = previous.clone();
    next.estado = input.estado;
    next.updated_at = now;
    if let Some(pagado) = input.pagado {
        next.pagado = pagado;
    }
    if input.estado == ReservationStatus::Cancelled {
        next.motivo_cancelacion = input.motivo.clone();
    }

    let releases = previous.estado.holds_capacity() && !next.estado.holds_capacity();
    let mut uow = UnitOfWork::begin(store, "reservation_status");
    let result = async {
        let saved = uow.save_reservation(&previous, &next).await?;
        if releases {
            if let Some(slot) = store.get_slot(previous.turno_id).await? {
                let mut freed = slot.clone();
                freed.cupo_disponible =
                    (slot.cupo_disponible + previous.cantidad_personas).min(slot.cupo_total);
                uow.save_slot(&slot, &freed).await?;
            }
        }
        Ok::<_, AppError>(saved)
    }
    .await;
    let saved = uow.finish(result).await?;

    tracing::info!(
        reserva_id = %saved.id,
        from = previous.estado.as_str(),
        to = saved.estado.as_str(),
        seats_released = releases,
        "Reservation status changed"
    );
    Ok(saved)
}
