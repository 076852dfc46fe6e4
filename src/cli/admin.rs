//! Record management from the terminal: categories, processes,
//! suppliers.

use crate::cli::output;
use crate::store::Store;
use anyhow::Result;

pub fn add_category(store: &dyn Store, name: &str) -> Result<()> {
    let category = store.add_category(name)?;
    if output::is_json() {
        output::print_json(&category);
    } else if !output::is_quiet() {
        eprintln!("  Category {} created (id {})", category.name, category.id);
    }
    Ok(())
}

pub fn list_categories(store: &dyn Store) -> Result<()> {
    let categories = store.categories()?;
    if output::is_json() {
        output::print_json(&categories);
        return Ok(());
    }
    for c in categories {
        println!("{:>4}  {}", c.id, c.name);
    }
    Ok(())
}

pub fn add_process(store: &dyn Store, portal_code: &str, category_id: i64) -> Result<()> {
    let process = store.add_process(portal_code, category_id)?;
    if output::is_json() {
        output::print_json(&process);
    } else if !output::is_quiet() {
        eprintln!("  Process {} created (id {})", process.portal_code, process.id);
    }
    Ok(())
}

pub fn list_processes(store: &dyn Store) -> Result<()> {
    let processes = store.processes()?;
    if output::is_json() {
        output::print_json(&processes);
        return Ok(());
    }
    for p in processes {
        println!(
            "{:>4}  {:<30} {:<20} category {}",
            p.id,
            p.portal_code,
            p.display_code.as_deref().unwrap_or("-"),
            p.category_id
        );
    }
    Ok(())
}

pub fn remove_process(store: &dyn Store, id: i64) -> Result<()> {
    store.delete_process(id)?;
    if !output::is_quiet() {
        eprintln!("  Process {id} deleted");
    }
    Ok(())
}

pub fn add_supplier(store: &dyn Store, ruc: &str, category_id: i64) -> Result<()> {
    let supplier = store.add_supplier(ruc, category_id)?;
    if output::is_json() {
        output::print_json(&supplier);
    } else if !output::is_quiet() {
        eprintln!("  Supplier {} created (id {})", supplier.ruc, supplier.id);
    }
    Ok(())
}

pub fn list_suppliers(store: &dyn Store) -> Result<()> {
    let suppliers = store.suppliers()?;
    if output::is_json() {
        output::print_json(&suppliers);
        return Ok(());
    }
    for s in suppliers {
        println!(
            "{:>4}  {:<15} {:<40} category {}",
            s.id,
            s.ruc,
            s.name.as_deref().unwrap_or("-"),
            s.category_id
        );
    }
    Ok(())
}
