//! Database commands: `supportdesk init-db`, `clients` and `stats`.

use anyhow::{Context, Result};

use supportdesk::config::SupportConfig;
use supportdesk::support::db::SupportDb;

use super::super::ClientsCommands;

fn open_db(config: &SupportConfig) -> Result<SupportDb> {
    SupportDb::new(&config.database.path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database.path.display()
        )
    })
}

pub fn cmd_init_db(config: &SupportConfig) -> Result<()> {
    let db = open_db(config)?;
    println!("Database ready at {}", config.database.path.display());
    println!();
    for (table, count) in db.table_counts()? {
        println!("  {:<22} {:>6}", table, count);
    }
    Ok(())
}

pub fn cmd_clients(config: &SupportConfig, command: ClientsCommands) -> Result<()> {
    let db = open_db(config)?;
    match command {
        ClientsCommands::Add {
            nom,
            prenom,
            email,
            type_client,
        } => {
            let client = db.create_client(&nom, &prenom, &email, &type_client)?;
            tracing::info!(client_id = client.id, email = %client.email, "Client registered");
            println!(
                "Client #{} created: {} <{}>",
                client.id,
                client.display_name(),
                client.email
            );
        }
        ClientsCommands::List => {
            let clients = db.list_clients()?;
            if clients.is_empty() {
                println!("No clients registered.");
                return Ok(());
            }
            println!("{:<5} {:<28} {:<36} {:<10}", "ID", "NAME", "EMAIL", "TYPE");
            for c in &clients {
                println!(
                    "{:<5} {:<28} {:<36} {:<10}",
                    c.id,
                    c.display_name(),
                    c.email,
                    c.type_client
                );
            }
            println!();
            println!("{} client(s)", clients.len());
        }
    }
    Ok(())
}

pub fn cmd_stats(config: &SupportConfig) -> Result<()> {
    let db = open_db(config)?;
    let tickets = db.ticket_stats()?;
    let shop = db.shop_statistics()?;

    println!("Tickets");
    println!("=======");
    for (status, count) in &tickets.by_status {
        println!("  {:<14} {:>6}", status, count);
    }
    println!("  {:<14} {:>6}", "total", tickets.total);
    println!();
    println!("Today: {} ticket(s)", tickets.today_total);
    if let Some(avg) = tickets.today_avg_response_time {
        println!("  avg response time  {:.2}s", avg);
    }
    if let Some(avg) = tickets.today_avg_quality {
        println!("  avg quality        {:.2}", avg);
    }
    if !tickets.by_category.is_empty() {
        println!();
        println!("By category:");
        for stat in &tickets.by_category {
            match stat.avg_quality {
                Some(q) => println!("  {:<22} {:>5}  (quality {:.2})", stat.category, stat.count, q),
                None => println!("  {:<22} {:>5}", stat.category, stat.count),
            }
        }
    }

    println!();
    println!("Shop");
    println!("====");
    println!("  clients        {}", shop.nb_clients);
    println!("  orders         {}", shop.nb_commandes);
    println!("  revenue        {:.2} €", shop.ca_total);
    println!("  average basket {:.2} €", shop.panier_moyen);
    if !shop.top_clients.is_empty() {
        println!();
        println!("Top clients:");
        for c in &shop.top_clients {
            println!("  {} {} ({} orders)", c.prenom, c.nom, c.nb_commandes);
        }
    }
    Ok(())
}
